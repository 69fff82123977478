//! Legacy-SQL query templates over the daily `app_events_YYYYMMDD` tables.
//!
//! Placeholders are positional (`{0}`, `{1}`, ...) and are filled with
//! `yyyy-MM-dd` dates. Inputs are trusted; nothing is escaped or validated
//! beyond the argument count.

use crate::error::AppError;

const LIST_UNIQUE_USERS: &str = "\
SELECT
  user_dim.app_info.app_instance_id AS user_id,
  FORMAT_UTC_USEC(MIN(user_dim.first_open_timestamp_micros)) AS first_seen,
  FIRST(user_dim.app_info.app_platform) AS platform
FROM
  TABLE_DATE_RANGE([analytics.app_events_], TIMESTAMP('{0}'), TIMESTAMP('{1}'))
GROUP BY
  user_id
ORDER BY
  first_seen";

const ALL_EVENTS_DAILY_COUNT: &str = "\
SELECT
  starts.date AS date,
  starts.session_starts AS session_starts,
  events.event_count AS event_count,
  events.active_users AS active_users
FROM (
  SELECT
    event_dim.date AS date,
    COUNT(*) AS session_starts
  FROM
    TABLE_DATE_RANGE([analytics.app_events_], TIMESTAMP('{0}'), TIMESTAMP('{1}'))
  WHERE
    event_dim.name = 'session_start'
  GROUP BY
    date
) AS starts
JOIN (
  SELECT
    event_dim.date AS date,
    COUNT(*) AS event_count,
    EXACT_COUNT_DISTINCT(user_dim.app_info.app_instance_id) AS active_users
  FROM
    TABLE_DATE_RANGE([analytics.app_events_], TIMESTAMP('{2}'), TIMESTAMP('{3}'))
  GROUP BY
    date
) AS events
ON
  starts.date = events.date
ORDER BY
  date";

/// Inclusive date bounds, `yyyy-MM-dd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The queries this job knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTemplate {
    /// One row per user: id, first-seen time, platform.
    ListUniqueUsers,
    /// One row per day: date, then session/event counts. Takes the range twice.
    AllEventsDailyCount,
}

impl QueryTemplate {
    pub fn name(self) -> &'static str {
        match self {
            QueryTemplate::ListUniqueUsers => "list_unique_users",
            QueryTemplate::AllEventsDailyCount => "all_events_daily_count",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            QueryTemplate::ListUniqueUsers => LIST_UNIQUE_USERS,
            QueryTemplate::AllEventsDailyCount => ALL_EVENTS_DAILY_COUNT,
        }
    }

    pub fn placeholder_count(self) -> usize {
        match self {
            QueryTemplate::ListUniqueUsers => 2,
            QueryTemplate::AllEventsDailyCount => 4,
        }
    }

    /// Fills the placeholders with `dates`, in order.
    pub fn render(self, dates: &[&str]) -> Result<String, AppError> {
        if dates.len() != self.placeholder_count() {
            return Err(AppError::Template(format!(
                "{} takes {} dates, got {}",
                self.name(),
                self.placeholder_count(),
                dates.len()
            )));
        }
        substitute(self.text(), dates)
    }

    /// Renders with the range laid out the way the template expects.
    pub fn render_range(self, range: &DateRange) -> Result<String, AppError> {
        let (start, end) = (range.start.as_str(), range.end.as_str());
        match self {
            QueryTemplate::ListUniqueUsers => self.render(&[start, end]),
            QueryTemplate::AllEventsDailyCount => self.render(&[start, end, start, end]),
        }
    }
}

/// Single-pass `{n}` substitution; substituted text is never rescanned.
fn substitute(template: &str, args: &[&str]) -> Result<String, AppError> {
    let extra: usize = args.iter().map(|a| a.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let placeholder = after
            .find('}')
            .and_then(|close| after[..close].parse::<usize>().ok().map(|i| (close, i)));

        match placeholder {
            Some((close, index)) => {
                let arg = args.get(index).ok_or_else(|| {
                    AppError::Template(format!("placeholder {{{}}} has no argument", index))
                })?;
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}
