//! In-memory store adapter.
//!
//! Backs tests and local runs without a database. All state lives in a
//! single `RwLock`-held map set; locks are never held across an await
//! point.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use mealtrack_core::{
    DeliveryId, DeliveryStatus, DietChartId, Email, PatientId, PreparationStatus, Role, UserId,
};

use super::{Store, StoreError};
use crate::models::{
    Delivery, DeliveryChartSummary, DeliveryPatch, DeliveryView, DietChart, DietChartView,
    NewDietChart, NewPatient, NewUser, Patient, PatientSummary, User, UserSummary,
};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, (User, String)>,
    patients: HashMap<PatientId, Patient>,
    diet_charts: HashMap<DietChartId, DietChart>,
    deliveries: HashMap<DeliveryId, Delivery>,
    next_id: i32,
}

impl Inner {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Assemble the denormalized view for one delivery.
///
/// Fails with `DataCorruption` if a referenced row is missing, since the
/// store never deletes referenced entities.
fn build_view(inner: &Inner, delivery: &Delivery) -> Result<DeliveryView, StoreError> {
    let chart = inner
        .diet_charts
        .get(&delivery.diet_chart_id)
        .ok_or_else(|| {
            StoreError::DataCorruption(format!(
                "delivery {} references missing diet chart {}",
                delivery.id, delivery.diet_chart_id
            ))
        })?;
    let patient = inner.patients.get(&chart.patient_id).ok_or_else(|| {
        StoreError::DataCorruption(format!(
            "diet chart {} references missing patient {}",
            chart.id, chart.patient_id
        ))
    })?;
    let pantry = lookup_summary(inner, delivery.assigned_to_pantry)?;
    let courier = delivery
        .assigned_to_delivery
        .map(|id| lookup_summary(inner, id))
        .transpose()?;

    Ok(DeliveryView {
        id: delivery.id,
        diet_chart: DeliveryChartSummary {
            id: chart.id,
            patient: PatientSummary::from(patient),
            date: chart.date,
            meal_type: chart.meal_type,
        },
        preparation_status: delivery.preparation_status,
        delivery_status: delivery.delivery_status,
        assigned_to_pantry: pantry,
        assigned_to_delivery: courier,
        delivered_at: delivery.delivered_at,
        version: delivery.version,
        created_at: delivery.created_at,
    })
}

fn lookup_summary(inner: &Inner, id: UserId) -> Result<UserSummary, StoreError> {
    inner
        .users
        .get(&id)
        .map(|(user, _)| UserSummary::from(user))
        .ok_or_else(|| StoreError::DataCorruption(format!("missing user {id}")))
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.write();
        if inner
            .users
            .values()
            .any(|(user, _)| user.email == new.email)
        {
            return Err(StoreError::ConstraintViolation(format!(
                "email already registered: {}",
                new.email
            )));
        }

        let user = User {
            id: UserId::new(inner.allocate_id()),
            full_name: new.full_name,
            email: new.email,
            role: new.role,
            created_at: Utc::now(),
        };
        inner
            .users
            .insert(user.id, (user.clone(), new.password_hash));
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read().users.get(&id).map(|(user, _)| user.clone()))
    }

    async fn find_user_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, StoreError> {
        Ok(self
            .read()
            .users
            .values()
            .find(|(user, _)| &user.email == email)
            .cloned())
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self
            .read()
            .users
            .values()
            .filter(|(user, _)| user.role == role)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(users)
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(i64::try_from(self.read().users.len()).unwrap_or(i64::MAX))
    }

    async fn create_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let mut inner = self.write();
        let now = Utc::now();
        let patient = Patient {
            id: PatientId::new(inner.allocate_id()),
            name: new.name,
            age: new.age,
            gender: new.gender,
            room_number: new.room_number,
            bed_number: new.bed_number,
            floor_number: new.floor_number,
            diseases: new.diseases,
            allergies: new.allergies,
            contact_number: new.contact_number,
            emergency_contact: new.emergency_contact,
            emergency_contact_number: new.emergency_contact_number,
            created_at: now,
            updated_at: now,
        };
        inner.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn update_patient(&self, id: PatientId, new: NewPatient) -> Result<Patient, StoreError> {
        let mut inner = self.write();
        let patient = inner.patients.get_mut(&id).ok_or(StoreError::NotFound)?;
        patient.name = new.name;
        patient.age = new.age;
        patient.gender = new.gender;
        patient.room_number = new.room_number;
        patient.bed_number = new.bed_number;
        patient.floor_number = new.floor_number;
        patient.diseases = new.diseases;
        patient.allergies = new.allergies;
        patient.contact_number = new.contact_number;
        patient.emergency_contact = new.emergency_contact;
        patient.emergency_contact_number = new.emergency_contact_number;
        patient.updated_at = Utc::now();
        Ok(patient.clone())
    }

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, StoreError> {
        Ok(self.read().patients.get(&id).cloned())
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let mut patients: Vec<Patient> = self.read().patients.values().cloned().collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(patients)
    }

    async fn create_diet_chart_with_delivery(
        &self,
        new: NewDietChart,
    ) -> Result<(DietChart, Delivery), StoreError> {
        let mut inner = self.write();
        if !inner.patients.contains_key(&new.patient_id) {
            return Err(StoreError::NotFound);
        }
        if !inner.users.contains_key(&new.assigned_pantry) {
            return Err(StoreError::NotFound);
        }

        let now = Utc::now();
        let chart = DietChart {
            id: DietChartId::new(inner.allocate_id()),
            patient_id: new.patient_id,
            date: new.date,
            meal_type: new.meal_type,
            ingredients: new.ingredients,
            instructions: new.instructions,
            assigned_pantry: new.assigned_pantry,
            created_at: now,
        };
        let delivery = Delivery {
            id: DeliveryId::new(inner.allocate_id()),
            diet_chart_id: chart.id,
            preparation_status: PreparationStatus::Pending,
            delivery_status: DeliveryStatus::Pending,
            assigned_to_pantry: new.assigned_pantry,
            assigned_to_delivery: None,
            delivered_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        inner.diet_charts.insert(chart.id, chart.clone());
        inner.deliveries.insert(delivery.id, delivery.clone());
        Ok((chart, delivery))
    }

    async fn get_diet_chart(&self, id: DietChartId) -> Result<Option<DietChart>, StoreError> {
        Ok(self.read().diet_charts.get(&id).cloned())
    }

    async fn list_diet_charts(&self) -> Result<Vec<DietChartView>, StoreError> {
        let inner = self.read();
        let mut charts: Vec<&DietChart> = inner.diet_charts.values().collect();
        charts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        charts
            .into_iter()
            .map(|chart| {
                let patient = inner.patients.get(&chart.patient_id).ok_or_else(|| {
                    StoreError::DataCorruption(format!(
                        "diet chart {} references missing patient {}",
                        chart.id, chart.patient_id
                    ))
                })?;
                let assignee = lookup_summary(&inner, chart.assigned_pantry)?;
                Ok(DietChartView {
                    id: chart.id,
                    patient: PatientSummary::from(patient),
                    date: chart.date,
                    meal_type: chart.meal_type,
                    ingredients: chart.ingredients.clone(),
                    instructions: chart.instructions.clone(),
                    assigned_pantry: assignee,
                    created_at: chart.created_at,
                })
            })
            .collect()
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
        Ok(self.read().deliveries.get(&id).cloned())
    }

    async fn get_delivery_view(&self, id: DeliveryId) -> Result<Option<DeliveryView>, StoreError> {
        let inner = self.read();
        inner
            .deliveries
            .get(&id)
            .map(|delivery| build_view(&inner, delivery))
            .transpose()
    }

    async fn list_deliveries_for(
        &self,
        role: Role,
        user_id: UserId,
    ) -> Result<Vec<DeliveryView>, StoreError> {
        let inner = self.read();
        let mut deliveries: Vec<&Delivery> = inner
            .deliveries
            .values()
            .filter(|delivery| match role {
                Role::Manager => true,
                Role::PantryStaff => delivery.assigned_to_pantry == user_id,
                Role::Delivery => delivery.assigned_to_delivery == Some(user_id),
            })
            .collect();
        deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        deliveries
            .into_iter()
            .map(|delivery| build_view(&inner, delivery))
            .collect()
    }

    async fn update_delivery(
        &self,
        id: DeliveryId,
        patch: DeliveryPatch,
    ) -> Result<Delivery, StoreError> {
        let mut inner = self.write();
        let delivery = inner.deliveries.get_mut(&id).ok_or(StoreError::NotFound)?;
        if delivery.version != patch.expected_version {
            return Err(StoreError::Conflict);
        }

        if let Some(status) = patch.preparation_status {
            delivery.preparation_status = status;
        }
        if let Some(status) = patch.delivery_status {
            delivery.delivery_status = status;
        }
        if let Some(assignee) = patch.assigned_to_delivery {
            delivery.assigned_to_delivery = Some(assignee);
        }
        if let Some(stamp) = patch.delivered_at {
            delivery.delivered_at = Some(stamp);
        }
        delivery.version += 1;
        delivery.updated_at = Utc::now();
        Ok(delivery.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str, role: Role) -> NewUser {
        NewUser {
            full_name: name.to_string(),
            email: Email::parse(email).unwrap(),
            role,
            password_hash: "$argon2id$test".to_string(),
        }
    }

    fn new_patient(name: &str) -> NewPatient {
        NewPatient {
            name: name.to_string(),
            age: 54,
            gender: mealtrack_core::Gender::Female,
            room_number: "204".to_string(),
            bed_number: "2".to_string(),
            floor_number: "2".to_string(),
            diseases: vec!["diabetes".to_string()],
            allergies: vec![],
            contact_number: None,
            emergency_contact: None,
            emergency_contact_number: None,
        }
    }

    async fn seed_delivery(store: &MemoryStore) -> (User, Delivery) {
        let pantry = store
            .create_user(new_user("P1", "p1@hospital.test", Role::PantryStaff))
            .await
            .unwrap();
        let patient = store.create_patient(new_patient("Jane Doe")).await.unwrap();
        let (_, delivery) = store
            .create_diet_chart_with_delivery(NewDietChart {
                patient_id: patient.id,
                date: chrono::NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                meal_type: mealtrack_core::MealType::Morning,
                ingredients: vec!["rice".to_string()],
                instructions: "low salt".to_string(),
                assigned_pantry: pantry.id,
            })
            .await
            .unwrap();
        (pantry, delivery)
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryStore::new();
        store
            .create_user(new_user("A", "a@hospital.test", Role::Manager))
            .await
            .unwrap();
        let err = store
            .create_user(new_user("B", "a@hospital.test", Role::Delivery))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_new_delivery_starts_pending() {
        let store = MemoryStore::new();
        let (pantry, delivery) = seed_delivery(&store).await;
        assert_eq!(delivery.preparation_status, PreparationStatus::Pending);
        assert_eq!(delivery.delivery_status, DeliveryStatus::Pending);
        assert_eq!(delivery.assigned_to_pantry, pantry.id);
        assert!(delivery.assigned_to_delivery.is_none());
        assert_eq!(delivery.version, 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let (_, delivery) = seed_delivery(&store).await;

        let updated = store
            .update_delivery(
                delivery.id,
                DeliveryPatch {
                    expected_version: 1,
                    preparation_status: Some(PreparationStatus::Preparing),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        // A writer still holding version 1 must not clobber the update.
        let err = store
            .update_delivery(
                delivery.id,
                DeliveryPatch {
                    expected_version: 1,
                    preparation_status: Some(PreparationStatus::Ready),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let current = store.get_delivery(delivery.id).await.unwrap().unwrap();
        assert_eq!(current.preparation_status, PreparationStatus::Preparing);
    }

    #[tokio::test]
    async fn test_role_scoped_listing() {
        let store = MemoryStore::new();
        let (pantry, delivery) = seed_delivery(&store).await;
        let courier = store
            .create_user(new_user("D1", "d1@hospital.test", Role::Delivery))
            .await
            .unwrap();
        let manager = store
            .create_user(new_user("M1", "m1@hospital.test", Role::Manager))
            .await
            .unwrap();

        // Unassigned courier sees nothing; pantry assignee and manager see it.
        assert!(
            store
                .list_deliveries_for(Role::Delivery, courier.id)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store
                .list_deliveries_for(Role::PantryStaff, pantry.id)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .list_deliveries_for(Role::Manager, manager.id)
                .await
                .unwrap()
                .len(),
            1
        );

        store
            .update_delivery(
                delivery.id,
                DeliveryPatch {
                    expected_version: 1,
                    assigned_to_delivery: Some(courier.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let views = store
            .list_deliveries_for(Role::Delivery, courier.id)
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(
            views.first().unwrap().assigned_to_delivery.as_ref().unwrap().id,
            courier.id
        );
    }

    #[tokio::test]
    async fn test_view_resolves_references() {
        let store = MemoryStore::new();
        let (pantry, delivery) = seed_delivery(&store).await;

        let view = store
            .get_delivery_view(delivery.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.diet_chart.patient.name, "Jane Doe");
        assert_eq!(view.diet_chart.patient.room_number, "204");
        assert_eq!(view.assigned_to_pantry.full_name, pantry.full_name);
        assert!(view.assigned_to_delivery.is_none());
    }
}
