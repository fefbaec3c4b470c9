use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use auth_cell::services::directory::set_role;
use shared_database::{uuid_column, Database};
use shared_models::auth::{AuthenticatedPrincipal, Role};

use crate::models::{
    AppointmentCounts, CreateDoctorRequest, Doctor, DoctorError, DoctorProfile,
    DoctorProfileRequest, DoctorSearchFilters, DoctorStats, SlotCounts,
};

const DOCTOR_COLUMNS: &str = "d.id, d.user_id, d.specialization, d.qualification, \
     d.experience_years, d.consultation_fee, d.bio, d.is_approved, d.created_at, d.updated_at";

fn map_doctor(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        specialization: row.get("specialization")?,
        qualification: row.get("qualification")?,
        experience_years: row.get("experience_years")?,
        consultation_fee: row.get("consultation_fee")?,
        bio: row.get("bio")?,
        is_approved: row.get("is_approved")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<DoctorProfile> {
    Ok(DoctorProfile {
        doctor: map_doctor(row)?,
        full_name: row.get("full_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
    })
}

pub fn find_doctor(conn: &Connection, doctor_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
    let doctor = conn
        .query_row(
            &format!("SELECT {} FROM doctors d WHERE d.id = ?1", DOCTOR_COLUMNS),
            params![doctor_id.to_string()],
            map_doctor,
        )
        .optional()?;
    Ok(doctor)
}

/// The doctor record owned by a user, if that user has one.
pub fn find_doctor_by_user(conn: &Connection, user_id: Uuid) -> Result<Option<Doctor>, DoctorError> {
    let doctor = conn
        .query_row(
            &format!("SELECT {} FROM doctors d WHERE d.user_id = ?1", DOCTOR_COLUMNS),
            params![user_id.to_string()],
            map_doctor,
        )
        .optional()?;
    Ok(doctor)
}

fn find_profile(conn: &Connection, clause: &str, key: Uuid) -> Result<Option<DoctorProfile>, DoctorError> {
    let sql = format!(
        "SELECT {}, u.full_name, u.email, u.phone
         FROM doctors d JOIN users u ON d.user_id = u.id
         WHERE {}",
        DOCTOR_COLUMNS, clause
    );
    let profile = conn
        .query_row(&sql, params![key.to_string()], map_profile)
        .optional()?;
    Ok(profile)
}

fn validate_profile(request: &DoctorProfileRequest) -> Result<String, DoctorError> {
    let specialization = request
        .specialization
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DoctorError::Validation("Specialization is required".to_string()))?;

    if request.experience_years.is_some_and(|years| years < 0) {
        return Err(DoctorError::Validation(
            "Experience years cannot be negative".to_string(),
        ));
    }
    if request.consultation_fee.is_some_and(|fee| fee < 0.0 || !fee.is_finite()) {
        return Err(DoctorError::Validation(
            "Consultation fee must be a non-negative amount".to_string(),
        ));
    }

    Ok(specialization.to_string())
}

fn insert_doctor(
    conn: &Connection,
    user_id: Uuid,
    specialization: &str,
    request: &DoctorProfileRequest,
    approved: bool,
) -> Result<Uuid, DoctorError> {
    let doctor_id = Uuid::new_v4();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO doctors (id, user_id, specialization, qualification, experience_years,
             consultation_fee, bio, is_approved, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            doctor_id.to_string(),
            user_id.to_string(),
            specialization,
            request.qualification,
            request.experience_years.unwrap_or(0),
            request.consultation_fee.unwrap_or(0.0),
            request.bio,
            approved,
            now
        ],
    )?;
    Ok(doctor_id)
}

pub struct DoctorService {
    db: Arc<Database>,
}

impl DoctorService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create the caller's own profile (unapproved) or update it in place.
    /// Returns the profile and whether it was newly created.
    pub async fn submit_profile(
        &self,
        principal: &AuthenticatedPrincipal,
        request: DoctorProfileRequest,
    ) -> Result<(DoctorProfile, bool), DoctorError> {
        let specialization = validate_profile(&request)?;
        let user_id = principal.id;
        let role = principal.role;

        self.db
            .transaction(move |tx| {
                let created = match find_doctor_by_user(tx, user_id)? {
                    Some(existing) => {
                        tx.execute(
                            "UPDATE doctors
                             SET specialization = ?1, qualification = ?2, experience_years = ?3,
                                 consultation_fee = ?4, bio = ?5, updated_at = ?6
                             WHERE id = ?7",
                            params![
                                specialization,
                                request.qualification,
                                request.experience_years.unwrap_or(existing.experience_years),
                                request.consultation_fee.unwrap_or(existing.consultation_fee),
                                request.bio,
                                Utc::now(),
                                existing.id.to_string()
                            ],
                        )?;
                        debug!("Updated doctor profile {}", existing.id);
                        false
                    }
                    None => {
                        let doctor_id = insert_doctor(tx, user_id, &specialization, &request, false)?;
                        // Admins keep their role when they also practise.
                        if role == Role::Patient {
                            set_role(tx, user_id, Role::Doctor)?;
                        }
                        info!("Doctor profile {} submitted by user {}, awaiting approval", doctor_id, user_id);
                        true
                    }
                };

                let profile = find_profile(tx, "d.user_id = ?1", user_id)?
                    .ok_or(DoctorError::ProfileNotFound)?;
                Ok((profile, created))
            })
            .await
    }

    /// Admin onboarding: a pre-approved profile for an existing directory user.
    pub async fn create_doctor(&self, request: CreateDoctorRequest) -> Result<DoctorProfile, DoctorError> {
        let specialization = validate_profile(&request.profile)?;
        let email = request.email.trim().to_string();
        if email.is_empty() {
            return Err(DoctorError::Validation("Email is required".to_string()));
        }

        self.db
            .transaction(move |tx| {
                let user_id: Option<String> = tx
                    .query_row(
                        "SELECT id FROM users WHERE email = ?1 COLLATE NOCASE",
                        params![email],
                        |row| row.get(0),
                    )
                    .optional()?;
                let user_id = user_id
                    .and_then(|raw| Uuid::parse_str(&raw).ok())
                    .ok_or(DoctorError::UserNotFound)?;

                if find_doctor_by_user(tx, user_id)?.is_some() {
                    return Err(DoctorError::AlreadyExists);
                }

                let doctor_id = insert_doctor(tx, user_id, &specialization, &request.profile, true)?;
                set_role(tx, user_id, Role::Doctor)?;
                info!("Admin created approved doctor {} for user {}", doctor_id, user_id);

                find_profile(tx, "d.id = ?1", doctor_id)?.ok_or(DoctorError::NotFound)
            })
            .await
    }

    pub async fn set_approval(&self, doctor_id: Uuid, is_approved: bool) -> Result<Doctor, DoctorError> {
        self.db
            .transaction(move |tx| {
                let changed = tx
                    .execute(
                        "UPDATE doctors SET is_approved = ?1, updated_at = ?2 WHERE id = ?3",
                        params![is_approved, Utc::now(), doctor_id.to_string()],
                    )?;
                if changed == 0 {
                    return Err(DoctorError::NotFound);
                }
                info!(
                    "Doctor {} {}",
                    doctor_id,
                    if is_approved { "approved" } else { "disapproved" }
                );
                find_doctor(tx, doctor_id)?.ok_or(DoctorError::NotFound)
            })
            .await
    }

    pub async fn list_doctors(&self, filters: DoctorSearchFilters) -> Result<Vec<DoctorProfile>, DoctorError> {
        debug!("Listing doctors with filters: {:?}", filters);

        self.db
            .read(move |conn| {
                let mut sql = format!(
                    "SELECT {}, u.full_name, u.email, u.phone
                     FROM doctors d JOIN users u ON d.user_id = u.id
                     WHERE (?1 IS NULL OR d.specialization LIKE '%' || ?1 || '%')",
                    DOCTOR_COLUMNS
                );
                if filters.approved_only.unwrap_or(false) {
                    sql.push_str(" AND d.is_approved = 1");
                }
                sql.push_str(" ORDER BY d.created_at DESC");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![filters.specialization], map_profile)
                    .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())?;
                Ok(rows)
            })
            .await
    }

    /// Public view: only approved doctors are visible.
    pub async fn get_doctor(&self, doctor_id: Uuid) -> Result<DoctorProfile, DoctorError> {
        self.db
            .read(move |conn| {
                find_profile(conn, "d.id = ?1 AND d.is_approved = 1", doctor_id)?
                    .ok_or(DoctorError::NotFound)
            })
            .await
    }

    pub async fn my_profile(&self, principal: &AuthenticatedPrincipal) -> Result<DoctorProfile, DoctorError> {
        let user_id = principal.id;
        self.db
            .read(move |conn| {
                find_profile(conn, "d.user_id = ?1", user_id)?.ok_or(DoctorError::ProfileNotFound)
            })
            .await
    }

    pub async fn my_stats(&self, principal: &AuthenticatedPrincipal) -> Result<DoctorStats, DoctorError> {
        let user_id = principal.id;
        self.db
            .read(move |conn| {
                let doctor = find_doctor_by_user(conn, user_id)?.ok_or(DoctorError::ProfileNotFound)?;
                let doctor_id = doctor.id.to_string();

                let appointments = conn
                    .query_row(
                        "SELECT
                             COALESCE(SUM(status = 'pending'), 0),
                             COALESCE(SUM(status = 'approved'), 0),
                             COALESCE(SUM(status = 'completed'), 0),
                             COALESCE(SUM(status = 'cancelled'), 0),
                             COUNT(*)
                         FROM appointments WHERE doctor_id = ?1",
                        params![doctor_id],
                        |row| {
                            Ok(AppointmentCounts {
                                pending_appointments: row.get(0)?,
                                approved_appointments: row.get(1)?,
                                completed_appointments: row.get(2)?,
                                cancelled_appointments: row.get(3)?,
                                total_appointments: row.get(4)?,
                            })
                        },
                    )?;

                let slots = conn
                    .query_row(
                        "SELECT
                             COALESCE(SUM(is_available = 1), 0),
                             COUNT(*),
                             COALESCE(SUM(current_bookings), 0)
                         FROM slots WHERE doctor_id = ?1",
                        params![doctor_id],
                        |row| {
                            Ok(SlotCounts {
                                available_slots: row.get(0)?,
                                total_slots: row.get(1)?,
                                total_bookings: row.get(2)?,
                            })
                        },
                    )?;

                Ok(DoctorStats { appointments, slots })
            })
            .await
    }
}
