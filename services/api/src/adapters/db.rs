//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Enumerated columns (role, species, gender, size) are stored as text and parsed
//! into their tagged types in the `to_domain` conversions below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use std::str::FromStr;
use trustpaws_core::domain::{
    Birthday, NewPetsProfile, NewProfile, Pet, PetDraft, PetGender, PetSize, PetType, PetsProfile,
    Profile, ProfileDetails, Role, Species,
};
use trustpaws_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn parse_opt<T>(value: Option<String>) -> PortResult<Option<T>>
where
    T: FromStr,
    PortError: From<T::Err>,
{
    Ok(value.map(|v| v.parse::<T>()).transpose()?)
}

fn small_to_u8(value: Option<i16>, column: &str) -> PortResult<Option<u8>> {
    value
        .map(|v| {
            u8::try_from(v).map_err(|_| PortError::Invalid(format!("{} out of range: {}", column, v)))
        })
        .transpose()
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
    phone_number: Option<String>,
    role: Option<String>,
}
impl ProfileRecord {
    fn to_domain(self) -> PortResult<Profile> {
        Ok(Profile {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            username: self.username,
            phone_number: self.phone_number,
            role: parse_opt::<Role>(self.role)?,
        })
    }
}

const PROFILE_COLUMNS: &str = "id, email, first_name, last_name, username, phone_number, role";

#[derive(FromRow)]
struct PetRecord {
    id: i64,
    tutor_id: Uuid,
    species: String,
    gender: Option<String>,
    castrated: Option<bool>,
    name: String,
    breed: String,
    size: Option<String>,
    birth_day: Option<i16>,
    birth_month: Option<i16>,
    birth_year: Option<i32>,
    know_day_month: bool,
    vaccines: Vec<String>,
    photo: Option<String>,
}
impl PetRecord {
    fn to_domain(self) -> PortResult<Pet> {
        Ok(Pet {
            id: self.id,
            tutor_id: self.tutor_id,
            details: PetDraft {
                species: self.species.parse::<Species>()?,
                gender: parse_opt::<PetGender>(self.gender)?,
                castrated: self.castrated,
                name: self.name,
                breed: self.breed,
                size: parse_opt::<PetSize>(self.size)?,
                birthday: Birthday {
                    day: small_to_u8(self.birth_day, "birth_day")?,
                    month: small_to_u8(self.birth_month, "birth_month")?,
                    year: self.birth_year,
                },
                know_day_month: self.know_day_month,
                vaccines: self.vaccines,
                photo: self.photo,
            },
        })
    }
}

const PET_COLUMNS: &str = "id, tutor_id, species, gender, castrated, name, breed, size, \
     birth_day, birth_month, birth_year, know_day_month, vaccines, photo";

#[derive(FromRow)]
struct PetsProfileRecord {
    id: i64,
    user_id: Uuid,
    pet_types: String,
    pet_count: String,
    location: String,
    created_at: DateTime<Utc>,
}
impl PetsProfileRecord {
    fn to_domain(self) -> PortResult<PetsProfile> {
        let pet_types: Vec<PetType> = serde_json::from_str(&self.pet_types)
            .map_err(|e| PortError::Invalid(format!("pet_types: {}", e)))?;
        let pet_count: BTreeMap<PetType, u32> = serde_json::from_str(&self.pet_count)
            .map_err(|e| PortError::Invalid(format!("pet_count: {}", e)))?;
        Ok(PetsProfile {
            id: self.id,
            user_id: self.user_id,
            pet_types,
            pet_count,
            location: self.location,
            created_at: self.created_at,
        })
    }
}

const PETS_PROFILE_COLUMNS: &str = "id, user_id, pet_types, pet_count, location, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record.map(ProfileRecord::to_domain).transpose()
    }

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "INSERT INTO profiles (id, email, role) VALUES ($1, $2, $3) RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(profile.id)
        .bind(&profile.email)
        .bind(profile.role.map(|r| r.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn upsert_profile_details(
        &self,
        user_id: Uuid,
        details: &ProfileDetails,
    ) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(&format!(
            "INSERT INTO profiles (id, first_name, last_name, username, phone_number) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                 first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, \
                 username = EXCLUDED.username, \
                 phone_number = EXCLUDED.phone_number \
             RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(&details.first_name)
        .bind(&details.last_name)
        .bind(&details.username)
        .bind(&details.phone_number)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> PortResult<()> {
        sqlx::query("UPDATE profiles SET role = $2 WHERE id = $1")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_pets(&self, tutor_id: Uuid) -> PortResult<Vec<Pet>> {
        let records = sqlx::query_as::<_, PetRecord>(&format!(
            "SELECT {} FROM pets WHERE tutor_id = $1 ORDER BY id DESC",
            PET_COLUMNS
        ))
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(PetRecord::to_domain).collect()
    }

    async fn insert_pet(&self, tutor_id: Uuid, pet: &PetDraft) -> PortResult<Pet> {
        let record = sqlx::query_as::<_, PetRecord>(&format!(
            "INSERT INTO pets (tutor_id, species, gender, castrated, name, breed, size, \
                 birth_day, birth_month, birth_year, know_day_month, vaccines, photo) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            PET_COLUMNS
        ))
        .bind(tutor_id)
        .bind(pet.species.as_str())
        .bind(pet.gender.map(|g| g.as_str()))
        .bind(pet.castrated)
        .bind(&pet.name)
        .bind(&pet.breed)
        .bind(pet.size.map(|s| s.as_str()))
        .bind(pet.birthday.day.map(i16::from))
        .bind(pet.birthday.month.map(i16::from))
        .bind(pet.birthday.year)
        .bind(pet.know_day_month)
        .bind(&pet.vaccines)
        .bind(&pet.photo)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn update_pet(&self, pet_id: i64, tutor_id: Uuid, pet: &PetDraft) -> PortResult<Pet> {
        // The photo column is owned by `set_pet_photo`; keep it when the form omits one.
        let record = sqlx::query_as::<_, PetRecord>(&format!(
            "UPDATE pets SET species = $3, gender = $4, castrated = $5, name = $6, breed = $7, \
                 size = $8, birth_day = $9, birth_month = $10, birth_year = $11, \
                 know_day_month = $12, vaccines = $13, photo = COALESCE($14, photo) \
             WHERE id = $1 AND tutor_id = $2 \
             RETURNING {}",
            PET_COLUMNS
        ))
        .bind(pet_id)
        .bind(tutor_id)
        .bind(pet.species.as_str())
        .bind(pet.gender.map(|g| g.as_str()))
        .bind(pet.castrated)
        .bind(&pet.name)
        .bind(&pet.breed)
        .bind(pet.size.map(|s| s.as_str()))
        .bind(pet.birthday.day.map(i16::from))
        .bind(pet.birthday.month.map(i16::from))
        .bind(pet.birthday.year)
        .bind(pet.know_day_month)
        .bind(&pet.vaccines)
        .bind(&pet.photo)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Pet {} not found", pet_id)))?;

        record.to_domain()
    }

    async fn set_pet_photo(&self, pet_id: i64, tutor_id: Uuid, photo: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE pets SET photo = $3 WHERE id = $1 AND tutor_id = $2")
            .bind(pet_id)
            .bind(tutor_id)
            .bind(photo)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Pet {} not found", pet_id)));
        }
        Ok(())
    }

    async fn delete_pet(&self, pet_id: i64, tutor_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM pets WHERE id = $1 AND tutor_id = $2")
            .bind(pet_id)
            .bind(tutor_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_pets_profile(&self, record: NewPetsProfile) -> PortResult<PetsProfile> {
        let pet_types = record
            .pet_types_json()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let pet_count = record
            .pet_count_json()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let row = sqlx::query_as::<_, PetsProfileRecord>(&format!(
            "INSERT INTO pets_profile (user_id, pet_types, pet_count, location, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            PETS_PROFILE_COLUMNS
        ))
        .bind(record.user_id)
        .bind(pet_types)
        .bind(pet_count)
        .bind(&record.location)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        row.to_domain()
    }

    async fn latest_pets_profile(&self, user_id: Uuid) -> PortResult<Option<PetsProfile>> {
        let row = sqlx::query_as::<_, PetsProfileRecord>(&format!(
            "SELECT {} FROM pets_profile WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            PETS_PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        row.map(PetsProfileRecord::to_domain).transpose()
    }
}
