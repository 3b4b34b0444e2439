//! Three-step sign-up: account, personal details, then donor details or a
//! confirmation screen.

use crate::api::ApiError;
use crate::auth::AuthStore;
use crate::model::{DonorDetails, RegistrationPayload, User};
use crate::validation::{self, FormErrors};
use thiserror::Error;

pub const REGISTER_FAILED: &str = "Registration failed. Please try again.";

/// Raw wizard input, as typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub city: String,
    pub is_donor: bool,
    pub blood_group: String,
    pub last_donation_date: String,
    pub available_for_donation: bool,
    pub consent_to_contact: bool,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0}")]
    Invalid(FormErrors),
    #[error("Finish the remaining steps first")]
    Incomplete,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Default)]
pub struct RegistrationWizard {
    form: RegistrationForm,
    step: usize,
    errors: FormErrors,
    error: Option<String>,
}

impl RegistrationWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RegistrationForm {
        &mut self.form
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn steps(&self) -> [&'static str; 3] {
        [
            "Account Information",
            "Personal Details",
            if self.form.is_donor {
                "Donor Information"
            } else {
                "Confirmation"
            },
        ]
    }

    pub fn current_label(&self) -> &'static str {
        self.steps()[self.step]
    }

    pub fn is_last_step(&self) -> bool {
        self.step == self.steps().len() - 1
    }

    pub fn set_donor(&mut self, is_donor: bool) {
        self.form.is_donor = is_donor;
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    /// Server-side failure from the last submit.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn validate_step(&self, step: usize) -> FormErrors {
        let f = &self.form;
        let mut errors = FormErrors::new();
        match step {
            0 => {
                errors.check("email", validation::email(&f.email));
                errors.check("password", validation::password(&f.password, true));
                errors.check(
                    "confirmPassword",
                    validation::confirm_password(&f.password, &f.confirm_password),
                );
            }
            1 => {
                errors.check("firstName", validation::first_name(&f.first_name));
                errors.check("lastName", validation::last_name(&f.last_name));
                errors.check("phoneNumber", validation::phone_number(&f.phone_number));
                errors.check("city", validation::city(&f.city));
            }
            _ if f.is_donor => {
                errors.check(
                    "bloodGroup",
                    validation::blood_group(&f.blood_group).map(|_| ()),
                );
                errors.check(
                    "lastDonationDate",
                    validation::last_donation_date(&f.last_donation_date).map(|_| ()),
                );
            }
            _ => {}
        }
        errors
    }

    /// Advance when the current step's fields are valid.
    pub fn next(&mut self) -> bool {
        self.errors = self.validate_step(self.step);
        if !self.errors.is_empty() || self.is_last_step() {
            return false;
        }
        self.step += 1;
        true
    }

    pub fn back(&mut self) {
        self.step = self.step.saturating_sub(1);
        self.errors = FormErrors::new();
    }

    /// Validate every step and build the request body.
    pub fn payload(&self) -> Result<RegistrationPayload, FormErrors> {
        let mut errors = FormErrors::new();
        for step in 0..self.steps().len() {
            for e in self.validate_step(step).iter() {
                errors.check(e.field, Err(e.message.clone()));
            }
        }
        errors.into_result()?;

        let f = &self.form;
        let donor = if f.is_donor {
            let blood_group = validation::blood_group(&f.blood_group)
                .map_err(|m| single("bloodGroup", m))?;
            let last_donation_date = validation::last_donation_date(&f.last_donation_date)
                .map_err(|m| single("lastDonationDate", m))?;
            Some(DonorDetails {
                blood_group,
                last_donation_date,
                available_for_donation: f.available_for_donation,
                consent_to_contact: f.consent_to_contact,
            })
        } else {
            None
        };

        Ok(RegistrationPayload {
            first_name: f.first_name.trim().to_string(),
            last_name: f.last_name.trim().to_string(),
            email: f.email.trim().to_string(),
            password: f.password.clone(),
            phone_number: f.phone_number.trim().to_string(),
            city: f.city.trim().to_string(),
            is_donor: f.is_donor,
            donor,
        })
    }

    /// Register and sign in. Only allowed from the last step.
    pub fn submit(&mut self, auth: &mut AuthStore) -> Result<User, SubmitError> {
        self.error = None;
        if !self.is_last_step() {
            return Err(SubmitError::Incomplete);
        }
        let payload = match self.payload() {
            Ok(payload) => payload,
            Err(errors) => {
                self.errors = errors.clone();
                return Err(SubmitError::Invalid(errors));
            }
        };
        self.errors = FormErrors::new();
        auth.register(&payload).map_err(|e| {
            self.error = Some(e.server_message().unwrap_or(REGISTER_FAILED).to_string());
            SubmitError::Api(e)
        })
    }
}

fn single(field: &'static str, message: String) -> FormErrors {
    let mut errors = FormErrors::new();
    errors.check(field, Err(message));
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::model::{BloodGroup, LoginResponse};
    use crate::storage::{self, MemoryStorage};
    use std::rc::Rc;

    fn filled(is_donor: bool) -> RegistrationWizard {
        let mut wizard = RegistrationWizard::new();
        *wizard.form_mut() = RegistrationForm {
            email: "ada@example.com".to_string(),
            password: "password1".to_string(),
            confirm_password: "password1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "King".to_string(),
            phone_number: "555-123-4567".to_string(),
            city: "London".to_string(),
            is_donor,
            blood_group: if is_donor { "O-".to_string() } else { String::new() },
            ..Default::default()
        };
        wizard
    }

    fn on_last_step(is_donor: bool) -> RegistrationWizard {
        let mut wizard = filled(is_donor);
        assert!(wizard.next());
        assert!(wizard.next());
        wizard
    }

    fn user() -> User {
        User {
            id: "u-1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "King".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: "555-123-4567".to_string(),
            city: "London".to_string(),
            is_donor: false,
            donor: None,
        }
    }

    #[test]
    fn test_non_donor_payload_omits_donor_fields() {
        let payload = filled(false).payload().unwrap();
        let body = serde_json::to_value(&payload).unwrap();
        let obj = body.as_object().unwrap();
        assert_eq!(obj["isDonor"], false);
        for key in [
            "bloodGroup",
            "lastDonationDate",
            "availableForDonation",
            "consentToContact",
        ] {
            assert!(!obj.contains_key(key), "unexpected key {}", key);
        }
    }

    #[test]
    fn test_donor_payload_defaults_flags_and_null_date() {
        let body = serde_json::to_value(filled(true).payload().unwrap()).unwrap();
        assert_eq!(body["isDonor"], true);
        assert_eq!(body["bloodGroup"], "O-");
        assert!(body["lastDonationDate"].is_null());
        assert_eq!(body["availableForDonation"], false);
        assert_eq!(body["consentToContact"], false);
    }

    #[test]
    fn test_step_gating() {
        let mut wizard = RegistrationWizard::new();
        assert!(!wizard.next());
        assert_eq!(wizard.step(), 0);
        assert_eq!(wizard.errors().get("email"), Some("Email is required"));

        let mut wizard = filled(false);
        wizard.form_mut().confirm_password = "different".to_string();
        assert!(!wizard.next());
        assert_eq!(
            wizard.errors().get("confirmPassword"),
            Some("Passwords do not match")
        );

        let mut wizard = filled(false);
        assert!(wizard.next());
        assert!(wizard.next());
        assert!(wizard.is_last_step());
        assert_eq!(wizard.current_label(), "Confirmation");
        assert!(!wizard.next());
        assert_eq!(wizard.step(), 2);
    }

    #[test]
    fn test_back_never_below_zero() {
        let mut wizard = filled(false);
        wizard.back();
        assert_eq!(wizard.step(), 0);
        wizard.next();
        wizard.back();
        assert_eq!(wizard.step(), 0);
    }

    #[test]
    fn test_donor_toggle_changes_last_label() {
        let mut wizard = RegistrationWizard::new();
        assert_eq!(wizard.steps()[2], "Confirmation");
        wizard.set_donor(true);
        assert_eq!(wizard.steps()[2], "Donor Information");
    }

    #[test]
    fn test_donor_without_blood_group_is_invalid() {
        let mut wizard = filled(true);
        wizard.form_mut().blood_group.clear();
        let errors = wizard.payload().unwrap_err();
        assert_eq!(errors.get("bloodGroup"), Some("Blood group is required"));
    }

    #[test]
    fn test_submit_registers_then_logs_in() {
        let api = Rc::new(MockApi {
            login_result: Some(Ok(LoginResponse {
                token: "tok".to_string(),
                user: user(),
            })),
            ..Default::default()
        });
        let storage = Rc::new(MemoryStorage::default());
        let mut auth = AuthStore::new(api.clone(), storage.clone());

        let mut wizard = on_last_step(true);
        let signed_in = wizard.submit(&mut auth).unwrap();
        assert_eq!(signed_in.id, "u-1");
        assert!(auth.is_authenticated());
        assert_eq!(api.calls(), vec!["register", "login:ada@example.com"]);
        assert_eq!(
            api.registrations.borrow()[0]
                .donor
                .as_ref()
                .map(|d| d.blood_group),
            Some(BloodGroup::ONeg)
        );
        assert_eq!(storage::token(storage.as_ref()).as_deref(), Some("tok"));
    }

    #[test]
    fn test_submit_failure_sets_error() {
        let api = Rc::new(MockApi {
            register_result: Some(Err(ApiError::Status {
                status: 400,
                message: Some("Email already registered".to_string()),
            })),
            ..Default::default()
        });
        let mut auth = AuthStore::new(api, Rc::new(MemoryStorage::default()));
        let mut wizard = on_last_step(false);
        assert!(matches!(
            wizard.submit(&mut auth),
            Err(SubmitError::Api(_))
        ));
        assert_eq!(wizard.error(), Some("Email already registered"));
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_submit_before_last_step_is_refused() {
        let api = Rc::new(MockApi::default());
        let mut auth = AuthStore::new(api.clone(), Rc::new(MemoryStorage::default()));
        let mut wizard = filled(false);
        assert!(wizard.next());
        assert!(matches!(
            wizard.submit(&mut auth),
            Err(SubmitError::Incomplete)
        ));
        assert!(api.calls().is_empty());
    }
}
