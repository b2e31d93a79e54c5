use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::EmergencyProfile;

pub fn get_emergency_profile(
    conn: &Connection,
    patient_id: &str,
) -> Result<Option<EmergencyProfile>, DatabaseError> {
    let profile = conn
        .query_row(
            "SELECT contact_name, contact_phone, hospital_name, hospital_email,
                    home_address, medical_conditions
             FROM emergency_profiles WHERE patient_id = ?1",
            params![patient_id],
            |row| {
                Ok(EmergencyProfile {
                    contact_name: row.get(0)?,
                    contact_phone: row.get(1)?,
                    hospital_name: row.get(2)?,
                    hospital_email: row.get(3)?,
                    home_address: row.get(4)?,
                    medical_conditions: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(profile)
}

/// Insert or replace the patient's emergency profile. Fields are
/// normalized first so blank strings are stored as NULL.
pub fn upsert_emergency_profile(
    conn: &Connection,
    patient_id: &str,
    profile: &EmergencyProfile,
) -> Result<EmergencyProfile, DatabaseError> {
    let profile = profile.clone().normalized();
    conn.execute(
        "INSERT INTO emergency_profiles (patient_id, contact_name, contact_phone, hospital_name,
                                         hospital_email, home_address, medical_conditions, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(patient_id) DO UPDATE SET
            contact_name = excluded.contact_name,
            contact_phone = excluded.contact_phone,
            hospital_name = excluded.hospital_name,
            hospital_email = excluded.hospital_email,
            home_address = excluded.home_address,
            medical_conditions = excluded.medical_conditions,
            updated_at_us = excluded.updated_at_us",
        params![
            patient_id,
            profile.contact_name,
            profile.contact_phone,
            profile.hospital_name,
            profile.hospital_email,
            profile.home_address,
            profile.medical_conditions,
            Utc::now().timestamp_micros(),
        ],
    )?;
    Ok(profile)
}
