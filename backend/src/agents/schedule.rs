// Agent Schedules - When a scheduled agent task runs next

use chrono::{DateTime, Datelike, Days, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How often a schedule fires. Every time is UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Once { at: DateTime<Utc> },
    Interval { minutes: i64 },
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
}

impl ScheduleFrequency {
    /// First due time for a schedule created at `now`.
    pub fn first_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleFrequency::Once { at } => Some(*at),
            _ => self.next_run_after(now),
        }
    }

    /// Next due time strictly after `after`, or `None` when the schedule
    /// never fires again.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleFrequency::Once { .. } => None,
            ScheduleFrequency::Interval { minutes } => {
                if *minutes <= 0 {
                    return None;
                }
                after.checked_add_signed(Duration::try_minutes(*minutes)?)
            }
            ScheduleFrequency::Daily { hour, minute } => {
                let time = NaiveTime::from_hms_opt(*hour, *minute, 0)?;
                let today = after.date_naive().and_time(time).and_utc();
                if today > after {
                    Some(today)
                } else {
                    today.checked_add_days(Days::new(1))
                }
            }
            ScheduleFrequency::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let time = NaiveTime::from_hms_opt(*hour, *minute, 0)?;
                let days_ahead = (7 + weekday.num_days_from_monday()
                    - after.weekday().num_days_from_monday())
                    % 7;
                let candidate = after
                    .date_naive()
                    .checked_add_days(Days::new(days_ahead as u64))?
                    .and_time(time)
                    .and_utc();
                if candidate > after {
                    Some(candidate)
                } else {
                    candidate.checked_add_days(Days::new(7))
                }
            }
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, ScheduleFrequency::Once { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Processing => "processing",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScheduleStatus::Pending),
            "processing" => Some(ScheduleStatus::Processing),
            "completed" => Some(ScheduleStatus::Completed),
            "failed" => Some(ScheduleStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A standing instruction for an AI agent, run on a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSchedule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Owner, notified on completion when `notify_on_completion` is set
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub name: String,
    pub instructions: String,
    pub frequency: ScheduleFrequency,
    pub next_run_at: Option<DateTime<Utc>>,
    pub status: ScheduleStatus,
    pub enabled: bool,
    pub run_count: i32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub notify_on_completion: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentSchedule {
    pub fn new(
        tenant_id: Uuid,
        user_id: Uuid,
        agent_id: Uuid,
        name: impl Into<String>,
        instructions: impl Into<String>,
        frequency: ScheduleFrequency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            agent_id,
            name: name.into(),
            instructions: instructions.into(),
            next_run_at: frequency.first_run(now),
            frequency,
            status: ScheduleStatus::Pending,
            enabled: true,
            run_count: 0,
            last_run_at: None,
            last_error: None,
            notify_on_completion: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn notify_on_completion(mut self) -> Self {
        self.notify_on_completion = true;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.status == ScheduleStatus::Pending
            && self.next_run_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_interval() {
        let freq = ScheduleFrequency::Interval { minutes: 90 };
        assert_eq!(freq.next_run_after(at(2026, 3, 1, 10, 0)), Some(at(2026, 3, 1, 11, 30)));
        assert_eq!(ScheduleFrequency::Interval { minutes: 0 }.next_run_after(at(2026, 3, 1, 10, 0)), None);
    }

    #[test]
    fn test_out_of_range_schedules_stop() {
        let now = at(2026, 3, 1, 10, 0);
        assert_eq!(ScheduleFrequency::Interval { minutes: i64::MAX }.next_run_after(now), None);
        assert_eq!(
            ScheduleFrequency::Interval { minutes: 1 }.next_run_after(DateTime::<Utc>::MAX_UTC),
            None
        );
        assert_eq!(
            ScheduleFrequency::Daily { hour: 0, minute: 0 }.next_run_after(DateTime::<Utc>::MAX_UTC),
            None
        );
        assert_eq!(
            ScheduleFrequency::Weekly {
                weekday: Weekday::Mon,
                hour: 0,
                minute: 0,
            }
            .next_run_after(DateTime::<Utc>::MAX_UTC),
            None
        );
    }

    #[test]
    fn test_daily_is_strictly_after() {
        let freq = ScheduleFrequency::Daily { hour: 9, minute: 0 };
        assert_eq!(freq.next_run_after(at(2026, 3, 1, 8, 59)), Some(at(2026, 3, 1, 9, 0)));
        // exactly at the slot rolls to tomorrow
        assert_eq!(freq.next_run_after(at(2026, 3, 1, 9, 0)), Some(at(2026, 3, 2, 9, 0)));
        assert_eq!(
            ScheduleFrequency::Daily { hour: 25, minute: 0 }.next_run_after(at(2026, 3, 1, 9, 0)),
            None
        );
    }

    #[test]
    fn test_weekly() {
        // 2026-03-02 is a Monday
        let freq = ScheduleFrequency::Weekly {
            weekday: Weekday::Wed,
            hour: 14,
            minute: 30,
        };
        assert_eq!(freq.next_run_after(at(2026, 3, 2, 8, 0)), Some(at(2026, 3, 4, 14, 30)));
        assert_eq!(freq.next_run_after(at(2026, 3, 4, 14, 30)), Some(at(2026, 3, 11, 14, 30)));
        assert_eq!(freq.next_run_after(at(2026, 3, 5, 0, 0)), Some(at(2026, 3, 11, 14, 30)));
    }

    #[test]
    fn test_once() {
        let when = at(2026, 4, 1, 12, 0);
        let freq = ScheduleFrequency::Once { at: when };
        assert_eq!(freq.first_run(at(2026, 3, 1, 0, 0)), Some(when));
        assert_eq!(freq.next_run_after(when), None);
        assert!(!freq.is_recurring());
    }

    #[test]
    fn test_is_due() {
        let now = at(2026, 3, 1, 10, 0);
        let mut schedule = AgentSchedule::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Daily digest",
            "Summarise yesterday's new leads",
            ScheduleFrequency::Once { at: now },
            now,
        );
        assert!(schedule.is_due(now));

        schedule.enabled = false;
        assert!(!schedule.is_due(now));

        schedule.enabled = true;
        schedule.status = ScheduleStatus::Processing;
        assert!(!schedule.is_due(now));
    }

    #[test]
    fn test_frequency_serde() {
        let freq: ScheduleFrequency =
            serde_json::from_value(serde_json::json!({"type": "daily", "hour": 7, "minute": 15})).unwrap();
        assert_eq!(freq, ScheduleFrequency::Daily { hour: 7, minute: 15 });
    }
}
