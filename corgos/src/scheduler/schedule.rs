use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone};

use crate::settings::ScheduleConfig;
use crate::settings::config::keys;
use crate::{Error, Result};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MINUTES_PER_DAY: u32 = 24 * 60;

/// Recurring refresh times: a set of weekdays at a fixed time of day.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl RefreshSchedule {
    /// Build the schedule from the configured weekdays (0 = Monday) and
    /// minute of the day. An empty weekday list disables recurring refreshes.
    pub fn from_config(config: &ScheduleConfig) -> Result<Option<Self>> {
        if config.minute_of_day >= MINUTES_PER_DAY {
            return Err(Error::invalid_setting(
                keys::LOAD_TIME,
                format!("{} is not a minute of the day", config.minute_of_day),
            ));
        }

        let mut days = config.days.clone();
        days.sort_unstable();
        days.dedup();
        if days.is_empty() {
            return Ok(None);
        }

        let names = days
            .iter()
            .map(|&day| {
                WEEKDAYS.get(usize::from(day)).copied().ok_or_else(|| {
                    Error::invalid_setting(keys::LOAD_DAYS, format!("{day} is not a weekday"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let expression = format!(
            "0 {} {} * * {}",
            config.minute_of_day % 60,
            config.minute_of_day / 60,
            names.join(",")
        );
        Self::parse(expression).map(Some)
    }

    fn parse(expression: String) -> Result<Self> {
        let schedule = cron::Schedule::from_str(&expression)
            .map_err(|e| Error::config(format!("invalid refresh schedule '{expression}': {e}")))?;
        Ok(Self {
            expression,
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First occurrence strictly after `after`, in the same timezone.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }

    /// Time left from `now` until the next occurrence.
    pub fn until_next<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<Duration> {
        let next = self.next_after(now)?;
        (next - now.clone()).to_std().ok()
    }
}
