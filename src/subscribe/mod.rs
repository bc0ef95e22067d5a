// src/subscribe/mod.rs
//! Durable recurring queries: a subscription re-runs its query once per day
//! at a fixed local time and delivers the digest by notification.

pub mod scheduler;
pub mod store;

use std::fmt;

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RequestError;
use crate::query::Query;

pub use scheduler::{Scheduler, SchedulerCfg, SchedulerHandle};
pub use store::{JsonFileStore, MemoryStore, StoreError, SubscriptionStore};

/// Wall-clock delivery time, minute granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NotifyTime {
    hour: u8,
    minute: u8,
}

impl NotifyTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, RequestError> {
        if hour > 23 || minute > 59 {
            return Err(RequestError::NotifyTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    /// Parse `HH:MM`.
    pub fn parse(s: &str) -> Result<Self, RequestError> {
        let invalid = || RequestError::NotifyTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for NotifyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for NotifyTime {
    type Error = RequestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<NotifyTime> for String {
    fn from(t: NotifyTime) -> Self {
        t.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Delivery address; also the partition key for lookups.
    pub email: String,
    pub query: Query,
    pub notification_time: NotifyTime,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        email: impl Into<String>,
        query: Query,
        notification_time: NotifyTime,
    ) -> Result<Self, RequestError> {
        let email = email.into().trim().to_string();
        if !is_plausible_email(&email) {
            return Err(RequestError::Email(email));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            email,
            query,
            notification_time,
            last_run: None,
            created_at: Utc::now(),
        })
    }

    /// Whether the subscription should fire at `now`: the wall-clock minute
    /// matches and the last run (if any) was on a prior calendar day. The
    /// calendar-day guard keeps a restart or a duplicate tick inside the same
    /// due window from re-firing.
    pub fn is_due<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        if now.hour() != u32::from(self.notification_time.hour)
            || now.minute() != u32::from(self.notification_time.minute)
        {
            return false;
        }
        match self.last_run {
            None => true,
            Some(last) => last.with_timezone(&now.timezone()).date_naive() < now.date_naive(),
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
