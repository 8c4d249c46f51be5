use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::dates::{format_date, parse_iso_date};
use crate::db::{last_insert_id, Database};
use crate::error::{BoxdeskError, Result};
use crate::reservations::non_empty;
use crate::schema::absences;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable)]
pub struct Absence {
    pub id: i32,
    pub name: String,
    pub date: String,
}

#[derive(Insertable)]
#[diesel(table_name = absences)]
struct NewAbsence<'a> {
    name: &'a str,
    date: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = absences)]
pub struct AbsencePatch {
    pub name: Option<String>,
    pub date: Option<String>,
}

impl AbsencePatch {
    fn normalized(self) -> Result<Self> {
        let date = non_empty(self.date)
            .map(|d| parse_iso_date(&d).map(format_date))
            .transpose()?;
        Ok(Self {
            name: non_empty(self.name),
            date,
        })
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.date.is_none()
    }
}

#[derive(Clone)]
pub struct AbsenceStore {
    db: Database,
}

impl AbsenceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Several absences for the same name and date are allowed.
    pub async fn create(&self, name: &str, date: &str) -> Result<Absence> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BoxdeskError::InvalidInput("name is required".to_string()));
        }
        let date = format_date(parse_iso_date(date)?);

        let mut conn = self.db.conn().await?;
        diesel::insert_into(absences::table)
            .values(&NewAbsence { name, date: &date })
            .execute(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        let id = last_insert_id(&mut conn).await?;
        tracing::info!(id, name, date = %date, "absence recorded");

        Ok(Absence {
            id,
            name: name.to_string(),
            date,
        })
    }

    pub async fn list_all(&self) -> Result<Vec<Absence>> {
        let mut conn = self.db.conn().await?;
        absences::table
            .order((absences::date.asc(), absences::name.asc()))
            .load(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))
    }

    pub async fn list_upcoming(&self, today: Date) -> Result<Vec<Absence>> {
        let today = format_date(today);
        let mut conn = self.db.conn().await?;
        absences::table
            .filter(absences::date.ge(&today))
            .order((absences::date.asc(), absences::name.asc()))
            .load(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))
    }

    pub async fn get(&self, id: i32) -> Result<Absence> {
        let mut conn = self.db.conn().await?;
        absences::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| BoxdeskError::Database(e.to_string()))?
            .ok_or_else(|| BoxdeskError::NotFound(format!("absence {id}")))
    }

    pub async fn update(&self, id: i32, patch: AbsencePatch) -> Result<Absence> {
        let patch = patch.normalized()?;
        if patch.is_empty() {
            return Err(BoxdeskError::InvalidInput("no update specified".to_string()));
        }
        let mut conn = self.db.conn().await?;
        let updated = diesel::update(absences::table.find(id))
            .set(&patch)
            .execute(&mut conn)
            .await
            .map_err(|e| BoxdeskError::Database(e.to_string()))?;
        drop(conn);
        if updated == 0 {
            return Err(BoxdeskError::NotFound(format!("absence {id}")));
        }
        self.get(id).await
    }
}
