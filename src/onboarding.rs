//! Sign-up onboarding as a single accumulated profile.
//!
//! [`OnboardingFlow`] owns the current step and an immutable
//! [`OnboardingProfile`]. Each accepted [`StepInput`] produces a new profile
//! and advances one step; rejected input leaves both untouched.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

pub const MINIMUM_AGE: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnboardingStep {
    SignUp,
    Name,
    Birthday,
    Gender,
    Languages,
    RelationshipPreference,
    PartnerAgeRange,
    CharacterTypes,
    PersonalityTraits,
    ProfilePhoto,
    Ready,
}

impl OnboardingStep {
    pub fn next(self) -> Option<Self> {
        use OnboardingStep::*;
        Some(match self {
            SignUp => Name,
            Name => Birthday,
            Birthday => Gender,
            Gender => Languages,
            Languages => RelationshipPreference,
            RelationshipPreference => PartnerAgeRange,
            PartnerAgeRange => CharacterTypes,
            CharacterTypes => PersonalityTraits,
            PersonalityTraits => ProfilePhoto,
            ProfilePhoto => Ready,
            Ready => return None,
        })
    }

    pub fn previous(self) -> Option<Self> {
        use OnboardingStep::*;
        Some(match self {
            SignUp => return None,
            Name => SignUp,
            Birthday => Name,
            Gender => Birthday,
            Languages => Gender,
            RelationshipPreference => Languages,
            PartnerAgeRange => RelationshipPreference,
            CharacterTypes => PartnerAgeRange,
            PersonalityTraits => CharacterTypes,
            ProfilePhoto => PersonalityTraits,
            Ready => ProfilePhoto,
        })
    }
}

/// Everything collected during onboarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub languages: Vec<String>,
    pub relationship_preference: Option<String>,
    pub partner_age_range: Option<String>,
    pub character_types: Vec<String>,
    pub personality_traits: Vec<String>,
    pub photo_uri: Option<String>,
}

impl OnboardingProfile {
    /// True once every step has been filled in.
    pub fn is_complete(&self) -> bool {
        self.email.is_some()
            && self.name.is_some()
            && self.birth_date.is_some()
            && self.gender.is_some()
            && !self.languages.is_empty()
            && self.relationship_preference.is_some()
            && self.partner_age_range.is_some()
            && !self.character_types.is_empty()
            && !self.personality_traits.is_empty()
            && self.photo_uri.is_some()
    }
}

/// Data submitted on one onboarding screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    SignUp {
        email: String,
        password: String,
        confirm_password: String,
        accepted_terms: bool,
    },
    Name(String),
    Birthday(NaiveDate),
    Gender(String),
    Languages(Vec<String>),
    RelationshipPreference(String),
    PartnerAgeRange(String),
    CharacterTypes(Vec<String>),
    PersonalityTraits(Vec<String>),
    ProfilePhoto(String),
}

impl StepInput {
    pub fn step(&self) -> OnboardingStep {
        match self {
            StepInput::SignUp { .. } => OnboardingStep::SignUp,
            StepInput::Name(_) => OnboardingStep::Name,
            StepInput::Birthday(_) => OnboardingStep::Birthday,
            StepInput::Gender(_) => OnboardingStep::Gender,
            StepInput::Languages(_) => OnboardingStep::Languages,
            StepInput::RelationshipPreference(_) => OnboardingStep::RelationshipPreference,
            StepInput::PartnerAgeRange(_) => OnboardingStep::PartnerAgeRange,
            StepInput::CharacterTypes(_) => OnboardingStep::CharacterTypes,
            StepInput::PersonalityTraits(_) => OnboardingStep::PersonalityTraits,
            StepInput::ProfilePhoto(_) => OnboardingStep::ProfilePhoto,
        }
    }
}

/// Coordinator for the onboarding screens.
#[derive(Debug, Clone)]
pub struct OnboardingFlow {
    step: OnboardingStep,
    profile: OnboardingProfile,
}

impl Default for OnboardingFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl OnboardingFlow {
    pub fn new() -> Self {
        Self {
            step: OnboardingStep::SignUp,
            profile: OnboardingProfile::default(),
        }
    }

    pub fn step(&self) -> OnboardingStep {
        self.step
    }

    pub fn profile(&self) -> &OnboardingProfile {
        &self.profile
    }

    /// Validate `input` for the current step and advance. `today` is used for
    /// the age check.
    pub fn submit(&mut self, input: StepInput, today: NaiveDate) -> ClientResult<OnboardingStep> {
        if input.step() != self.step {
            return Err(ClientError::InvalidInput(format!(
                "expected input for {:?}, got {:?}",
                self.step,
                input.step()
            )));
        }

        let profile = apply(&self.profile, input, today)?;
        let next = self.step.next().ok_or_else(|| {
            ClientError::InvalidInput("onboarding is already complete".to_string())
        })?;
        self.profile = profile;
        self.step = next;
        Ok(next)
    }

    /// Go back one step. Data already entered is kept so screens can prefill.
    pub fn back(&mut self) -> Option<OnboardingStep> {
        let previous = self.step.previous()?;
        self.step = previous;
        Some(previous)
    }

    /// Consume the flow once it has reached `Ready`.
    pub fn finish(self) -> ClientResult<OnboardingProfile> {
        if self.step != OnboardingStep::Ready || !self.profile.is_complete() {
            return Err(ClientError::InvalidInput(format!(
                "onboarding is not finished (at {:?})",
                self.step
            )));
        }
        Ok(self.profile)
    }
}

fn apply(
    profile: &OnboardingProfile,
    input: StepInput,
    today: NaiveDate,
) -> ClientResult<OnboardingProfile> {
    let mut next = profile.clone();
    match input {
        StepInput::SignUp {
            email,
            password,
            confirm_password,
            accepted_terms,
        } => {
            let email = required("email", email)?;
            if password != confirm_password {
                return Err(ClientError::InvalidInput("passwords do not match".to_string()));
            }
            if !accepted_terms {
                return Err(ClientError::InvalidInput("terms must be accepted".to_string()));
            }
            next.email = Some(email);
            next.password = Some(password);
        }
        StepInput::Name(name) => next.name = Some(required("name", name)?),
        StepInput::Birthday(date) => {
            let age = age_on(date, today);
            if age < MINIMUM_AGE {
                return Err(ClientError::InvalidInput(format!(
                    "must be at least {MINIMUM_AGE} years old"
                )));
            }
            next.birth_date = Some(date);
        }
        StepInput::Gender(gender) => next.gender = Some(required("gender", gender)?),
        StepInput::Languages(languages) => next.languages = non_empty("languages", languages)?,
        StepInput::RelationshipPreference(pref) => {
            next.relationship_preference = Some(required("relationship preference", pref)?)
        }
        StepInput::PartnerAgeRange(range) => {
            next.partner_age_range = Some(required("partner age range", range)?)
        }
        StepInput::CharacterTypes(types) => next.character_types = non_empty("character types", types)?,
        StepInput::PersonalityTraits(traits) => {
            next.personality_traits = non_empty("personality traits", traits)?
        }
        StepInput::ProfilePhoto(uri) => next.photo_uri = Some(required("photo", uri)?),
    }
    Ok(next)
}

fn required(field: &str, value: String) -> ClientResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidInput(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn non_empty(field: &str, values: Vec<String>) -> ClientResult<Vec<String>> {
    if values.is_empty() {
        return Err(ClientError::InvalidInput(format!("select at least one of {field}")));
    }
    Ok(values)
}

/// Whole years between `birth` and `today`. Zero for future dates.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    today.years_since(birth).unwrap_or(0)
}
