use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::dates::{format_date, parse_iso_date, validate_hour};
use crate::db::{last_insert_id, Database};
use crate::error::{BoxdeskError, Result};
use crate::schema::reservations;

pub const DEFAULT_RESERVED_BY: &str = "Agent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable)]
pub struct Reservation {
    pub id: i32,
    pub date: String,
    pub hour: String,
    pub reserved_by: String,
}

#[derive(Insertable)]
#[diesel(table_name = reservations)]
struct NewReservation<'a> {
    date: &'a str,
    hour: &'a str,
    reserved_by: &'a str,
}

/// Partial update; empty strings count as "not provided".
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = reservations)]
pub struct ReservationPatch {
    pub date: Option<String>,
    pub hour: Option<String>,
    pub reserved_by: Option<String>,
}

impl ReservationPatch {
    fn normalized(self) -> Result<Self> {
        let date = non_empty(self.date)
            .map(|d| parse_iso_date(&d).map(format_date))
            .transpose()?;
        let hour = non_empty(self.hour).map(|h| validate_hour(&h)).transpose()?;
        Ok(Self {
            date,
            hour,
            reserved_by: non_empty(self.reserved_by),
        })
    }

    fn is_empty(&self) -> bool {
        self.date.is_none() && self.hour.is_none() && self.reserved_by.is_none()
    }
}

#[derive(Clone)]
pub struct ReservationStore {
    db: Database,
}

impl ReservationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Books a slot. Duplicate (date, hour) pairs are accepted.
    pub async fn create(&self, date: &str, hour: &str, reserved_by: &str) -> Result<Reservation> {
        let date = format_date(parse_iso_date(date)?);
        let hour = validate_hour(hour)?;
        let reserved_by = match reserved_by.trim() {
            "" => DEFAULT_RESERVED_BY,
            name => name,
        };
        let new = NewReservation {
            date: &date,
            hour: &hour,
            reserved_by,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(reservations::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        let id = last_insert_id(&mut conn).await?;
        tracing::info!(id, date = %date, hour = %hour, reserved_by, "reservation created");

        Ok(Reservation {
            id,
            date,
            hour,
            reserved_by: reserved_by.to_string(),
        })
    }

    pub async fn list_all(&self) -> Result<Vec<Reservation>> {
        let mut conn = self.db.conn().await?;
        reservations::table
            .order((reservations::date.asc(), reservations::hour.asc()))
            .load(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))
    }

    /// Reservations later today (at or after `now_hour`) or on a later date.
    pub async fn list_upcoming(&self, today: Date, now_hour: &str) -> Result<Vec<Reservation>> {
        let today = format_date(today);
        let mut conn = self.db.conn().await?;
        reservations::table
            .filter(
                reservations::date.gt(&today).or(reservations::date
                    .eq(&today)
                    .and(reservations::hour.ge(now_hour))),
            )
            .order((reservations::date.asc(), reservations::hour.asc()))
            .load(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))
    }

    pub async fn get(&self, id: i32) -> Result<Reservation> {
        let mut conn = self.db.conn().await?;
        reservations::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| BoxdeskError::Database(e.to_string()))?
            .ok_or_else(|| BoxdeskError::NotFound(format!("reservation {id}")))
    }

    pub async fn update(&self, id: i32, patch: ReservationPatch) -> Result<Reservation> {
        let patch = patch.normalized()?;
        if patch.is_empty() {
            return Err(BoxdeskError::InvalidInput("no update specified".to_string()));
        }
        let mut conn = self.db.conn().await?;
        let updated = diesel::update(reservations::table.find(id))
            .set(&patch)
            .execute(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        drop(conn);
        if updated == 0 {
            return Err(BoxdeskError::NotFound(format!("reservation {id}")));
        }
        self.get(id).await
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
