//! Own-profile editing and donor lookups.

use crate::api::{ApiError, DonorApi};
use crate::auth::AuthStore;
use crate::model::{BloodGroup, DonorRecord, ProfileUpdate, User};
use crate::validation::{self, FormErrors};
use chrono::NaiveDate;
use thiserror::Error;

pub const LOAD_FAILED: &str = "Failed to load profile. Please try again later.";
pub const UPDATE_FAILED: &str = "Failed to update profile. Please try again.";
pub const UPDATED: &str = "Profile updated successfully!";

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileForm {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub city: String,
    pub is_donor: bool,
    pub blood_group: Option<BloodGroup>,
    pub last_donation_date: Option<NaiveDate>,
    pub available_for_donation: bool,
    pub consent_to_contact: bool,
}

impl ProfileForm {
    /// A user counts as a donor here when the server embedded donor details.
    pub fn from_user(user: &User) -> Self {
        let donor = user.donor.as_ref();
        Self {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            city: user.city.clone(),
            is_donor: donor.is_some(),
            blood_group: donor.map(|d| d.blood_group),
            last_donation_date: donor.and_then(|d| d.last_donation_date),
            available_for_donation: donor.is_some_and(|d| d.available_for_donation),
            consent_to_contact: donor.is_some_and(|d| d.consent_to_contact),
        }
    }

    pub fn become_donor(&mut self) {
        self.is_donor = true;
        if self.blood_group.is_none() {
            self.blood_group = Some(BloodGroup::APos);
        }
    }

    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::new();
        errors.check("firstName", validation::first_name(&self.first_name));
        errors.check("lastName", validation::last_name(&self.last_name));
        errors.check("phoneNumber", validation::phone_number(&self.phone_number));
        errors.check("city", validation::city(&self.city));
        if self.is_donor && self.blood_group.is_none() {
            errors.check("bloodGroup", Err("Blood group is required".to_string()));
        }
        errors.into_result()
    }

    /// Contact fields always go out; donor fields only when `was_donor` or
    /// this form opts in.
    pub fn update_payload(&self, was_donor: bool) -> ProfileUpdate {
        let mut update = ProfileUpdate {
            first_name: Some(self.first_name.trim().to_string()),
            last_name: Some(self.last_name.trim().to_string()),
            phone_number: Some(self.phone_number.trim().to_string()),
            city: Some(self.city.trim().to_string()),
            ..Default::default()
        };
        if was_donor || self.is_donor {
            update.is_donor = Some(true);
            update.blood_group = self.blood_group;
            update.last_donation_date = self.last_donation_date;
            update.available_for_donation = Some(self.available_for_donation);
            update.consent_to_contact = Some(self.consent_to_contact);
        }
        update
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{0}")]
    Invalid(FormErrors),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The signed-in user's profile: the saved copy plus the form being edited.
#[derive(Debug)]
pub struct ProfileEditor {
    saved: ProfileForm,
    form: ProfileForm,
    error: Option<String>,
    notice: Option<String>,
}

impl ProfileEditor {
    pub fn new(user: &User) -> Self {
        let saved = ProfileForm::from_user(user);
        Self {
            form: saved.clone(),
            saved,
            error: None,
            notice: None,
        }
    }

    /// Fetch the current profile from the server.
    pub fn load(api: &dyn DonorApi) -> Result<Self, ApiError> {
        let user = api.profile().map_err(|e| {
            tracing::warn!(error = %e, "profile load failed");
            e
        })?;
        Ok(Self::new(&user))
    }

    pub fn saved(&self) -> &ProfileForm {
        &self.saved
    }

    pub fn form(&self) -> &ProfileForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ProfileForm {
        &mut self.form
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn discard(&mut self) {
        self.form = self.saved.clone();
    }

    pub fn save(&mut self, auth: &mut AuthStore) -> Result<(), ProfileError> {
        self.error = None;
        self.notice = None;
        self.form.validate().map_err(ProfileError::Invalid)?;

        let update = self.form.update_payload(self.saved.is_donor);
        match auth.update_profile(&update) {
            Ok(_) => {
                self.saved = self.form.clone();
                self.notice = Some(UPDATED.to_string());
                Ok(())
            }
            Err(e) => {
                self.error = Some(UPDATE_FAILED.to_string());
                Err(e.into())
            }
        }
    }
}

/// Another donor's public record. Requires a signed-in session.
pub fn donor_details(
    api: &dyn DonorApi,
    auth: &AuthStore,
    id: &str,
) -> Result<DonorRecord, ApiError> {
    if !auth.is_authenticated() {
        return Err(ApiError::Unauthorized {
            message: Some("Please log in to view donor profiles".to_string()),
        });
    }
    api.donor(id)
}

/// Whether `id` names the signed-in user rather than someone else.
pub fn is_own_profile(auth: &AuthStore, id: Option<&str>) -> bool {
    match (id, auth.user()) {
        (None, _) => true,
        (Some(id), Some(user)) => id == user.id,
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::model::{DonorProfile, LoginResponse};
    use crate::storage::{self, MemoryStorage};
    use std::rc::Rc;

    fn plain_user() -> User {
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

    fn donor_user() -> User {
        User {
            is_donor: true,
            donor: Some(DonorProfile {
                blood_group: BloodGroup::BNeg,
                last_donation_date: NaiveDate::from_ymd_opt(2025, 1, 2),
                available_for_donation: true,
                consent_to_contact: true,
                latitude: None,
                longitude: None,
            }),
            ..plain_user()
        }
    }

    fn signed_in(api: MockApi, user: User) -> (AuthStore, Rc<MockApi>, Rc<MemoryStorage>) {
        let api = Rc::new(MockApi {
            login_result: Some(Ok(LoginResponse {
                token: "tok".to_string(),
                user,
            })),
            ..api
        });
        let storage = Rc::new(MemoryStorage::default());
        let mut auth = AuthStore::new(api.clone(), storage.clone());
        auth.login("ada@example.com", "password1").unwrap();
        (auth, api, storage)
    }

    #[test]
    fn test_form_from_user_copies_donor_fields() {
        let form = ProfileForm::from_user(&donor_user());
        assert!(form.is_donor);
        assert_eq!(form.blood_group, Some(BloodGroup::BNeg));
        assert!(form.available_for_donation);

        let form = ProfileForm::from_user(&plain_user());
        assert!(!form.is_donor);
        assert_eq!(form.blood_group, None);
    }

    #[test]
    fn test_update_payload_for_non_donor_has_contact_fields_only() {
        let update = ProfileForm::from_user(&plain_user()).update_payload(false);
        let body = serde_json::to_value(&update).unwrap();
        let keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(body["city"], "London");
    }

    #[test]
    fn test_become_donor_defaults() {
        let mut form = ProfileForm::from_user(&plain_user());
        form.become_donor();
        assert!(form.is_donor);
        assert_eq!(form.blood_group, Some(BloodGroup::APos));
        assert!(!form.available_for_donation);
        assert!(!form.consent_to_contact);

        let update = form.update_payload(false);
        assert_eq!(update.is_donor, Some(true));
        assert_eq!(update.available_for_donation, Some(false));
        assert_eq!(update.consent_to_contact, Some(false));
    }

    #[test]
    fn test_existing_donor_keeps_blood_group_on_opt_in() {
        let mut form = ProfileForm::from_user(&donor_user());
        form.become_donor();
        assert_eq!(form.blood_group, Some(BloodGroup::BNeg));
    }

    #[test]
    fn test_save_merges_into_session() {
        let (mut auth, api, storage) = signed_in(MockApi::default(), plain_user());
        let mut editor = ProfileEditor::new(&plain_user());
        editor.form_mut().city = "Paris".to_string();
        editor.form_mut().become_donor();
        editor.save(&mut auth).unwrap();

        assert_eq!(editor.notice(), Some(UPDATED));
        assert_eq!(editor.saved().city, "Paris");
        let sent = &api.updates.borrow()[0];
        assert_eq!(sent.blood_group, Some(BloodGroup::APos));

        let cached = storage::cached_user(storage.as_ref()).unwrap();
        assert_eq!(cached.city, "Paris");
        assert!(cached.is_donor);
        assert_eq!(cached.donor.map(|d| d.blood_group), Some(BloodGroup::APos));
    }

    #[test]
    fn test_save_rejects_invalid_form_without_calling_api() {
        let (mut auth, api, _) = signed_in(MockApi::default(), plain_user());
        let mut editor = ProfileEditor::new(&plain_user());
        editor.form_mut().phone_number = "nope".to_string();
        let err = editor.save(&mut auth).unwrap_err();
        assert!(matches!(err, ProfileError::Invalid(_)));
        assert!(!api.calls().contains(&"update_profile".to_string()));
    }

    #[test]
    fn test_save_failure_sets_banner() {
        let failing = MockApi {
            update_result: Some(Err(ApiError::Network("down".to_string()))),
            ..Default::default()
        };
        let (mut auth, _, _) = signed_in(failing, plain_user());
        let mut editor = ProfileEditor::new(&plain_user());
        assert!(editor.save(&mut auth).is_err());
        assert_eq!(editor.error(), Some(UPDATE_FAILED));
    }

    #[test]
    fn test_load_uses_profile_endpoint() {
        let api = MockApi {
            profile_result: Some(Ok(donor_user())),
            ..Default::default()
        };
        let editor = ProfileEditor::load(&api).unwrap();
        assert!(editor.saved().is_donor);
        assert!(ProfileEditor::load(&MockApi::default()).is_err());
    }

    #[test]
    fn test_donor_details_requires_session() {
        let api = Rc::new(MockApi::default());
        let auth = AuthStore::new(api.clone(), Rc::new(MemoryStorage::default()));
        let err = donor_details(api.as_ref(), &auth, "3").unwrap_err();
        assert!(err.is_unauthorized());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_is_own_profile() {
        let (auth, _, _) = signed_in(MockApi::default(), plain_user());
        assert!(is_own_profile(&auth, None));
        assert!(is_own_profile(&auth, Some("u-1")));
        assert!(!is_own_profile(&auth, Some("3")));
    }
}
