//! `PostgreSQL` store adapter.
//!
//! Queries are runtime-checked `query_as` calls over the schema created by
//! the migrations in `crates/server/migrations/`. Status and role enums are
//! stored as their snake_case text forms; decoding a value that no longer
//! parses is surfaced as `DataCorruption` rather than a panic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use mealtrack_core::{
    DeliveryId, DietChartId, Email, Gender, MealType, PatientId, Role, UserId,
};

use super::{Store, StoreError};
use crate::models::{
    Delivery, DeliveryChartSummary, DeliveryPatch, DeliveryView, DietChart, DietChartView,
    NewDietChart, NewPatient, NewUser, Patient, PatientSummary, User, UserSummary,
};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// `PostgreSQL`-backed [`Store`] implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (sessions share it).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    full_name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct UserWithPasswordRow {
    id: i32,
    full_name: String,
    email: String,
    role: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PatientRow {
    id: i32,
    name: String,
    age: i32,
    gender: String,
    room_number: String,
    bed_number: String,
    floor_number: String,
    diseases: Vec<String>,
    allergies: Vec<String>,
    contact_number: Option<String>,
    emergency_contact: Option<String>,
    emergency_contact_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DietChartRow {
    id: i32,
    patient_id: i32,
    date: NaiveDate,
    meal_type: String,
    ingredients: Vec<String>,
    instructions: String,
    assigned_pantry: i32,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DietChartViewRow {
    id: i32,
    date: NaiveDate,
    meal_type: String,
    ingredients: Vec<String>,
    instructions: String,
    created_at: DateTime<Utc>,
    patient_id: i32,
    patient_name: String,
    room_number: String,
    bed_number: String,
    floor_number: String,
    pantry_id: i32,
    pantry_name: String,
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: i32,
    diet_chart_id: i32,
    preparation_status: String,
    delivery_status: String,
    assigned_to_pantry: i32,
    assigned_to_delivery: Option<i32>,
    delivered_at: Option<DateTime<Utc>>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DeliveryViewRow {
    id: i32,
    preparation_status: String,
    delivery_status: String,
    delivered_at: Option<DateTime<Utc>>,
    version: i32,
    created_at: DateTime<Utc>,
    chart_id: i32,
    chart_date: NaiveDate,
    meal_type: String,
    patient_id: i32,
    patient_name: String,
    room_number: String,
    bed_number: String,
    floor_number: String,
    pantry_id: i32,
    pantry_name: String,
    courier_id: Option<i32>,
    courier_name: Option<String>,
}

// =============================================================================
// Row conversions
// =============================================================================

/// Parse a stored enum text form, surfacing bad data as corruption.
fn parse_column<T: std::str::FromStr<Err = String>>(
    value: &str,
    column: &str,
) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|e: String| StoreError::DataCorruption(format!("bad {column}: {e}")))
}

fn parse_email(value: &str) -> Result<Email, StoreError> {
    Email::parse(value)
        .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: UserId::new(row.id),
            full_name: row.full_name,
            email: parse_email(&row.email)?,
            role: parse_column::<Role>(&row.role, "role")?,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<PatientRow> for Patient {
    type Error = StoreError;

    fn try_from(row: PatientRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: PatientId::new(row.id),
            name: row.name,
            age: row.age,
            gender: parse_column::<Gender>(&row.gender, "gender")?,
            room_number: row.room_number,
            bed_number: row.bed_number,
            floor_number: row.floor_number,
            diseases: row.diseases,
            allergies: row.allergies,
            contact_number: row.contact_number,
            emergency_contact: row.emergency_contact,
            emergency_contact_number: row.emergency_contact_number,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<DietChartRow> for DietChart {
    type Error = StoreError;

    fn try_from(row: DietChartRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: DietChartId::new(row.id),
            patient_id: PatientId::new(row.patient_id),
            date: row.date,
            meal_type: parse_column::<MealType>(&row.meal_type, "meal_type")?,
            ingredients: row.ingredients,
            instructions: row.instructions,
            assigned_pantry: UserId::new(row.assigned_pantry),
            created_at: row.created_at,
        })
    }
}

impl TryFrom<DeliveryRow> for Delivery {
    type Error = StoreError;

    fn try_from(row: DeliveryRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: DeliveryId::new(row.id),
            diet_chart_id: DietChartId::new(row.diet_chart_id),
            preparation_status: parse_column(&row.preparation_status, "preparation_status")?,
            delivery_status: parse_column(&row.delivery_status, "delivery_status")?,
            assigned_to_pantry: UserId::new(row.assigned_to_pantry),
            assigned_to_delivery: row.assigned_to_delivery.map(UserId::new),
            delivered_at: row.delivered_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<DeliveryViewRow> for DeliveryView {
    type Error = StoreError;

    fn try_from(row: DeliveryViewRow) -> Result<Self, StoreError> {
        let assigned_to_delivery = match (row.courier_id, row.courier_name) {
            (Some(id), Some(full_name)) => Some(UserSummary {
                id: UserId::new(id),
                full_name,
            }),
            _ => None,
        };

        Ok(Self {
            id: DeliveryId::new(row.id),
            diet_chart: DeliveryChartSummary {
                id: DietChartId::new(row.chart_id),
                patient: PatientSummary {
                    id: PatientId::new(row.patient_id),
                    name: row.patient_name,
                    room_number: row.room_number,
                    bed_number: row.bed_number,
                    floor_number: row.floor_number,
                },
                date: row.chart_date,
                meal_type: parse_column::<MealType>(&row.meal_type, "meal_type")?,
            },
            preparation_status: parse_column(&row.preparation_status, "preparation_status")?,
            delivery_status: parse_column(&row.delivery_status, "delivery_status")?,
            assigned_to_pantry: UserSummary {
                id: UserId::new(row.pantry_id),
                full_name: row.pantry_name,
            },
            assigned_to_delivery,
            delivered_at: row.delivered_at,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

/// Map an insert error, translating unique violations to
/// `ConstraintViolation`.
fn map_insert_error(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::ConstraintViolation(format!("{what} already exists"));
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    StoreError::Database(err)
}

const DELIVERY_VIEW_SELECT: &str = r"
    SELECT d.id, d.preparation_status, d.delivery_status, d.delivered_at,
           d.version, d.created_at,
           c.id AS chart_id, c.date AS chart_date, c.meal_type,
           p.id AS patient_id, p.name AS patient_name,
           p.room_number, p.bed_number, p.floor_number,
           pu.id AS pantry_id, pu.full_name AS pantry_name,
           du.id AS courier_id, du.full_name AS courier_name
    FROM deliveries d
    JOIN diet_charts c ON c.id = d.diet_chart_id
    JOIN patients p ON p.id = c.patient_id
    JOIN users pu ON pu.id = d.assigned_to_pantry
    LEFT JOIN users du ON du.id = d.assigned_to_delivery
";

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO users (full_name, email, role, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, full_name, email, role, created_at
            ",
        )
        .bind(&new.full_name)
        .bind(new.email.as_str())
        .bind(new.role.to_string())
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "user email"))?;

        row.try_into()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, full_name, email, role, created_at FROM users WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_user_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, StoreError> {
        let row = sqlx::query_as::<_, UserWithPasswordRow>(
            r"
            SELECT id, full_name, email, role, password_hash, created_at
            FROM users WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let hash = row.password_hash.clone();
            let user = User::try_from(UserRow {
                id: row.id,
                full_name: row.full_name,
                email: row.email,
                role: row.role,
                created_at: row.created_at,
            })?;
            Ok((user, hash))
        })
        .transpose()
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, full_name, email, role, created_at
            FROM users WHERE role = $1
            ORDER BY full_name
            ",
        )
        .bind(role.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let row = sqlx::query_as::<_, PatientRow>(
            r"
            INSERT INTO patients
                (name, age, gender, room_number, bed_number, floor_number,
                 diseases, allergies, contact_number, emergency_contact,
                 emergency_contact_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, name, age, gender, room_number, bed_number,
                      floor_number, diseases, allergies, contact_number,
                      emergency_contact, emergency_contact_number,
                      created_at, updated_at
            ",
        )
        .bind(&new.name)
        .bind(new.age)
        .bind(new.gender.to_string())
        .bind(&new.room_number)
        .bind(&new.bed_number)
        .bind(&new.floor_number)
        .bind(&new.diseases)
        .bind(&new.allergies)
        .bind(&new.contact_number)
        .bind(&new.emergency_contact)
        .bind(&new.emergency_contact_number)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update_patient(&self, id: PatientId, new: NewPatient) -> Result<Patient, StoreError> {
        let row = sqlx::query_as::<_, PatientRow>(
            r"
            UPDATE patients
            SET name = $2, age = $3, gender = $4, room_number = $5,
                bed_number = $6, floor_number = $7, diseases = $8,
                allergies = $9, contact_number = $10, emergency_contact = $11,
                emergency_contact_number = $12, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, age, gender, room_number, bed_number,
                      floor_number, diseases, allergies, contact_number,
                      emergency_contact, emergency_contact_number,
                      created_at, updated_at
            ",
        )
        .bind(id.as_i32())
        .bind(&new.name)
        .bind(new.age)
        .bind(new.gender.to_string())
        .bind(&new.room_number)
        .bind(&new.bed_number)
        .bind(&new.floor_number)
        .bind(&new.diseases)
        .bind(&new.allergies)
        .bind(&new.contact_number)
        .bind(&new.emergency_contact)
        .bind(&new.emergency_contact_number)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, StoreError> {
        let row = sqlx::query_as::<_, PatientRow>(
            r"
            SELECT id, name, age, gender, room_number, bed_number,
                   floor_number, diseases, allergies, contact_number,
                   emergency_contact, emergency_contact_number,
                   created_at, updated_at
            FROM patients WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Patient::try_from).transpose()
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let rows = sqlx::query_as::<_, PatientRow>(
            r"
            SELECT id, name, age, gender, room_number, bed_number,
                   floor_number, diseases, allergies, contact_number,
                   emergency_contact, emergency_contact_number,
                   created_at, updated_at
            FROM patients ORDER BY created_at DESC, id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Patient::try_from).collect()
    }

    async fn create_diet_chart_with_delivery(
        &self,
        new: NewDietChart,
    ) -> Result<(DietChart, Delivery), StoreError> {
        let mut tx = self.pool.begin().await?;

        let chart_row = sqlx::query_as::<_, DietChartRow>(
            r"
            INSERT INTO diet_charts
                (patient_id, date, meal_type, ingredients, instructions,
                 assigned_pantry)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, patient_id, date, meal_type, ingredients,
                      instructions, assigned_pantry, created_at
            ",
        )
        .bind(new.patient_id.as_i32())
        .bind(new.date)
        .bind(new.meal_type.to_string())
        .bind(&new.ingredients)
        .bind(&new.instructions)
        .bind(new.assigned_pantry.as_i32())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, "diet chart"))?;

        let delivery_row = sqlx::query_as::<_, DeliveryRow>(
            r"
            INSERT INTO deliveries (diet_chart_id, assigned_to_pantry)
            VALUES ($1, $2)
            RETURNING id, diet_chart_id, preparation_status, delivery_status,
                      assigned_to_pantry, assigned_to_delivery, delivered_at,
                      version, created_at, updated_at
            ",
        )
        .bind(chart_row.id)
        .bind(new.assigned_pantry.as_i32())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, "delivery"))?;

        tx.commit().await?;

        Ok((chart_row.try_into()?, delivery_row.try_into()?))
    }

    async fn get_diet_chart(&self, id: DietChartId) -> Result<Option<DietChart>, StoreError> {
        let row = sqlx::query_as::<_, DietChartRow>(
            r"
            SELECT id, patient_id, date, meal_type, ingredients, instructions,
                   assigned_pantry, created_at
            FROM diet_charts WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DietChart::try_from).transpose()
    }

    async fn list_diet_charts(&self) -> Result<Vec<DietChartView>, StoreError> {
        let rows = sqlx::query_as::<_, DietChartViewRow>(
            r"
            SELECT c.id, c.date, c.meal_type, c.ingredients, c.instructions,
                   c.created_at,
                   p.id AS patient_id, p.name AS patient_name,
                   p.room_number, p.bed_number, p.floor_number,
                   u.id AS pantry_id, u.full_name AS pantry_name
            FROM diet_charts c
            JOIN patients p ON p.id = c.patient_id
            JOIN users u ON u.id = c.assigned_pantry
            ORDER BY c.created_at DESC, c.id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DietChartView {
                    id: DietChartId::new(row.id),
                    patient: PatientSummary {
                        id: PatientId::new(row.patient_id),
                        name: row.patient_name,
                        room_number: row.room_number,
                        bed_number: row.bed_number,
                        floor_number: row.floor_number,
                    },
                    date: row.date,
                    meal_type: parse_column::<MealType>(&row.meal_type, "meal_type")?,
                    ingredients: row.ingredients,
                    instructions: row.instructions,
                    assigned_pantry: UserSummary {
                        id: UserId::new(row.pantry_id),
                        full_name: row.pantry_name,
                    },
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query_as::<_, DeliveryRow>(
            r"
            SELECT id, diet_chart_id, preparation_status, delivery_status,
                   assigned_to_pantry, assigned_to_delivery, delivered_at,
                   version, created_at, updated_at
            FROM deliveries WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Delivery::try_from).transpose()
    }

    async fn get_delivery_view(&self, id: DeliveryId) -> Result<Option<DeliveryView>, StoreError> {
        let query = format!("{DELIVERY_VIEW_SELECT} WHERE d.id = $1");
        let row = sqlx::query_as::<_, DeliveryViewRow>(&query)
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?;

        row.map(DeliveryView::try_from).transpose()
    }

    async fn list_deliveries_for(
        &self,
        role: Role,
        user_id: UserId,
    ) -> Result<Vec<DeliveryView>, StoreError> {
        let filter = match role {
            Role::Manager => "TRUE",
            Role::PantryStaff => "d.assigned_to_pantry = $1",
            Role::Delivery => "d.assigned_to_delivery = $1",
        };
        let query = format!(
            "{DELIVERY_VIEW_SELECT} WHERE {filter} ORDER BY d.created_at DESC, d.id DESC"
        );

        let mut q = sqlx::query_as::<_, DeliveryViewRow>(&query);
        if role != Role::Manager {
            q = q.bind(user_id.as_i32());
        }
        let rows = q.fetch_all(&self.pool).await?;

        rows.into_iter().map(DeliveryView::try_from).collect()
    }

    async fn update_delivery(
        &self,
        id: DeliveryId,
        patch: DeliveryPatch,
    ) -> Result<Delivery, StoreError> {
        let row = sqlx::query_as::<_, DeliveryRow>(
            r"
            UPDATE deliveries
            SET preparation_status = COALESCE($3, preparation_status),
                delivery_status = COALESCE($4, delivery_status),
                assigned_to_delivery = COALESCE($5, assigned_to_delivery),
                delivered_at = COALESCE($6, delivered_at),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING id, diet_chart_id, preparation_status, delivery_status,
                      assigned_to_pantry, assigned_to_delivery, delivered_at,
                      version, created_at, updated_at
            ",
        )
        .bind(id.as_i32())
        .bind(patch.expected_version)
        .bind(patch.preparation_status.map(|s| s.to_string()))
        .bind(patch.delivery_status.map(|s| s.to_string()))
        .bind(patch.assigned_to_delivery.map(|user_id| user_id.as_i32()))
        .bind(patch.delivered_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            // Distinguish a missing row from a lost version race.
            None => {
                let exists: Option<i32> =
                    sqlx::query_scalar("SELECT version FROM deliveries WHERE id = $1")
                        .bind(id.as_i32())
                        .fetch_optional(&self.pool)
                        .await?;
                match exists {
                    Some(_) => Err(StoreError::Conflict),
                    None => Err(StoreError::NotFound),
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
