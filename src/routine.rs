use crate::error::ValidationError;
use crate::model::UserId;
use crate::validate;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub type RoutineId = i64;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// How a routine repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    /// Every N days from the start date.
    Daily,
    /// Every N weeks, on the start date's weekday.
    Weekly,
    /// Every N months, on the start date's day of month.
    Monthly,
    Weekdays,
    Weekends,
    /// An explicit set of weekdays.
    Custom,
}

impl RepeatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RepeatKind::Daily => "daily",
            RepeatKind::Weekly => "weekly",
            RepeatKind::Monthly => "monthly",
            RepeatKind::Weekdays => "weekdays",
            RepeatKind::Weekends => "weekends",
            RepeatKind::Custom => "custom",
        }
    }
}

impl fmt::Display for RepeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(RepeatKind::Daily),
            "weekly" => Ok(RepeatKind::Weekly),
            "monthly" => Ok(RepeatKind::Monthly),
            "weekdays" => Ok(RepeatKind::Weekdays),
            "weekends" => Ok(RepeatKind::Weekends),
            "custom" => Ok(RepeatKind::Custom),
            _ => Err(ValidationError::Unknown {
                kind: "repeat type",
                value: s.to_string(),
            }),
        }
    }
}

/// A set of weekdays packed into seven bits, Monday being bit 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    pub fn from_bits(bits: u8) -> WeekdaySet {
        WeekdaySet(bits & 0x7f)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !(1 << day.num_days_from_monday());
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days: Vec<String> = self.iter().map(|d| d.to_string()).collect();
        f.write_str(&days.join(","))
    }
}

/// Recurrence rule embedded in a routine. The interval only matters for
/// the daily, weekly and monthly kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatRule {
    pub kind: RepeatKind,
    pub interval: u32,
    pub custom_days: WeekdaySet,
}

impl RepeatRule {
    pub fn new(kind: RepeatKind) -> RepeatRule {
        RepeatRule {
            kind,
            interval: 1,
            custom_days: WeekdaySet::EMPTY,
        }
    }

    pub fn every(mut self, interval: u32) -> RepeatRule {
        self.interval = interval;
        self
    }

    pub fn on<I: IntoIterator<Item = Weekday>>(days: I) -> RepeatRule {
        RepeatRule {
            kind: RepeatKind::Custom,
            interval: 1,
            custom_days: days.into_iter().collect(),
        }
    }

    /// Builds a rule of any kind. `days` only counts for custom rules and
    /// is dropped otherwise.
    pub fn with_days<I: IntoIterator<Item = Weekday>>(kind: RepeatKind, interval: u32, days: I) -> RepeatRule {
        let custom_days = match kind {
            RepeatKind::Custom => days.into_iter().collect(),
            _ => WeekdaySet::EMPTY,
        };
        RepeatRule {
            kind,
            interval,
            custom_days,
        }
    }
}

impl Default for RepeatRule {
    fn default() -> Self {
        RepeatRule::new(RepeatKind::Daily)
    }
}

impl fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RepeatKind::Daily | RepeatKind::Weekly | RepeatKind::Monthly if self.interval > 1 => {
                write!(f, "{} (every {})", self.kind, self.interval)
            }
            RepeatKind::Custom => write!(f, "custom ({})", self.custom_days),
            _ => write!(f, "{}", self.kind),
        }
    }
}

/// Blueprint for one generated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Copied into the generated task's properties.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl TaskTemplate {
    pub fn new(title: &str, description: &str) -> TaskTemplate {
        TaskTemplate {
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            extra: Map::new(),
        }
    }
}

/// A user-defined recurrence rule plus the templates it turns into tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    /// `None` until the routine has been stored.
    pub id: Option<RoutineId>,
    pub name: String,
    pub description: String,
    pub user_id: UserId,
    pub rule: RepeatRule,
    pub active: bool,
    pub created_at: DateTime<Local>,
    pub last_generated: Option<DateTime<Local>>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub preferred_time: Option<NaiveTime>,
    pub templates: Vec<TaskTemplate>,
}

impl Routine {
    /// An active, daily routine starting on `now`'s date.
    pub fn new(name: &str, description: &str, user_id: UserId, now: DateTime<Local>) -> Routine {
        Routine {
            id: None,
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            user_id,
            rule: RepeatRule::default(),
            active: true,
            created_at: now,
            last_generated: None,
            start_date: now.date_naive(),
            end_date: None,
            preferred_time: None,
            templates: Vec::new(),
        }
    }

    pub fn add_template(&mut self, title: &str, description: &str) {
        self.templates.push(TaskTemplate::new(title, description));
    }

    /// Removes the first template with this title.
    pub fn remove_template(&mut self, title: &str) -> bool {
        match self.templates.iter().position(|t| t.title == title) {
            Some(idx) => {
                self.templates.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::routine_name(&self.name)?;
        if self.rule.interval == 0 {
            return Err(ValidationError::ZeroInterval);
        }
        if self.rule.kind == RepeatKind::Custom && self.rule.custom_days.is_empty() {
            return Err(ValidationError::NoCustomDays);
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ValidationError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        for template in &self.templates {
            validate::template_title(&template.title)?;
        }
        Ok(())
    }

    pub fn start_weekday(&self) -> Weekday {
        self.start_date.weekday()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 6, 7, 30, 0).unwrap()
    }

    #[test]
    fn new_routine_defaults() {
        let r = Routine::new("  Morning ", "", 1, now());
        assert_eq!(r.name, "Morning");
        assert!(r.active);
        assert_eq!(r.rule, RepeatRule::new(RepeatKind::Daily));
        assert_eq!(r.start_date, NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
        assert_eq!(r.start_weekday(), Weekday::Wed);
    }

    #[test]
    fn weekday_set_packs_into_seven_bits() {
        let set: WeekdaySet = vec![Weekday::Mon, Weekday::Wed, Weekday::Sun].into_iter().collect();
        assert_eq!(set.bits(), 0b100_0101);
        assert_eq!(set.len(), 3);
        assert!(set.contains(Weekday::Wed));
        assert!(!set.contains(Weekday::Tue));
        assert_eq!(set.to_string(), "Mon,Wed,Sun");
        assert_eq!(WeekdaySet::from_bits(0xff).len(), 7);
    }

    #[test]
    fn remove_template_drops_first_match_only() {
        let mut r = Routine::new("Morning", "", 1, now());
        r.add_template("Stretch", "");
        r.add_template("Read", "");
        r.add_template("Stretch", "again");
        assert!(r.remove_template("Stretch"));
        assert_eq!(r.templates.len(), 2);
        assert_eq!(r.templates[1].description, "again");
        assert!(!r.remove_template("Run"));
    }

    #[test]
    fn validation_catches_bad_rules() {
        let mut r = Routine::new("Morning", "", 1, now());
        assert_eq!(r.validate(), Ok(()));

        r.rule = RepeatRule::new(RepeatKind::Weekly).every(0);
        assert_eq!(r.validate(), Err(ValidationError::ZeroInterval));

        r.rule = RepeatRule::new(RepeatKind::Custom);
        assert_eq!(r.validate(), Err(ValidationError::NoCustomDays));

        r.rule = RepeatRule::on([Weekday::Fri]);
        r.end_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert!(matches!(r.validate(), Err(ValidationError::EndBeforeStart { .. })));

        r.end_date = None;
        r.add_template("  ", "");
        assert_eq!(r.validate(), Err(ValidationError::Empty("template title")));

        let blank = Routine::new(" ", "", 1, now());
        assert_eq!(blank.validate(), Err(ValidationError::Empty("routine name")));
    }

    #[test]
    fn template_titles_must_fit_once_dated() {
        let mut r = Routine::new("Long", "", 1, now());
        r.add_template(&"x".repeat(validate::MAX_TEMPLATE_TITLE_LEN), "");
        assert_eq!(r.validate(), Ok(()));

        // Also bounded with several templates: removing one can leave a single.
        r.add_template(&"y".repeat(195), "");
        assert!(matches!(
            r.validate(),
            Err(ValidationError::TooLong { field: "template title", .. })
        ));
    }

    #[test]
    fn templates_serialize_without_empty_extras() {
        let t = TaskTemplate::new("Stretch", "");
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            r#"{"title":"Stretch","description":""}"#
        );
        let parsed: TaskTemplate = serde_json::from_str(r#"{"title":"Run","extra":{"km":5}}"#).unwrap();
        assert_eq!(parsed.description, "");
        assert_eq!(parsed.extra["km"], 5);
    }

    #[test]
    fn days_are_kept_for_custom_rules_only() {
        let days = [Weekday::Mon, Weekday::Thu];
        let weekly = RepeatRule::with_days(RepeatKind::Weekly, 2, days);
        assert_eq!(weekly, RepeatRule::new(RepeatKind::Weekly).every(2));
        assert!(weekly.custom_days.is_empty());

        let custom = RepeatRule::with_days(RepeatKind::Custom, 1, days);
        assert_eq!(custom, RepeatRule::on(days));
    }

    #[test]
    fn rules_display_their_interval() {
        assert_eq!(RepeatRule::new(RepeatKind::Daily).every(2).to_string(), "daily (every 2)");
        assert_eq!(RepeatRule::new(RepeatKind::Weekends).to_string(), "weekends");
        assert_eq!(RepeatRule::on([Weekday::Tue, Weekday::Thu]).to_string(), "custom (Tue,Thu)");
        assert_eq!("Weekly".parse::<RepeatKind>().unwrap(), RepeatKind::Weekly);
    }
}
