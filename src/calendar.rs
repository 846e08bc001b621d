use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, Utc, Weekday};

use crate::models::Ride;

pub type Week = [Option<NaiveDate>; 7];

/// Calendar day of `ts` as seen from `offset`.
pub fn local_day(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = first_of_month(date);
    first
        .checked_add_months(Months::new(1))
        .map(|next| next.signed_duration_since(first).num_days() as u32)
        .unwrap_or(31)
}

/// Month view state: which month is on screen and which weekday starts a row.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarGridBuilder {
    current: NaiveDate,
    first_weekday: Weekday,
    offset: FixedOffset,
}

impl CalendarGridBuilder {
    pub fn new(current: NaiveDate, first_weekday: Weekday, offset: FixedOffset) -> Self {
        Self {
            current,
            first_weekday,
            offset,
        }
    }

    pub fn current_month(&self) -> NaiveDate {
        self.current
    }

    pub fn first_weekday(&self) -> Weekday {
        self.first_weekday
    }

    /// Rows of seven cells; cells outside `month` are `None`.
    pub fn build_grid(&self, month: NaiveDate) -> Vec<Week> {
        let first = first_of_month(month);
        let lead = (7 + first.weekday().num_days_from_monday()
            - self.first_weekday.num_days_from_monday()) as usize
            % 7;
        let days = days_in_month(first) as usize;

        let mut cells: Vec<Option<NaiveDate>> = vec![None; lead];
        cells.extend(first.iter_days().take(days).map(Some));
        let trailing = (7 - cells.len() % 7) % 7;
        cells.extend(std::iter::repeat(None).take(trailing));

        cells
            .chunks(7)
            .map(|chunk| {
                let mut week = [None; 7];
                week.copy_from_slice(chunk);
                week
            })
            .collect()
    }

    pub fn current_grid(&self) -> Vec<Week> {
        self.build_grid(self.current)
    }

    /// Moves forward one month. Day-of-month is clamped by chrono, so Jan 31
    /// becomes Feb 29 in a leap year.
    pub fn next_month(&mut self) {
        if let Some(next) = self.current.checked_add_months(Months::new(1)) {
            self.current = next;
        }
    }

    pub fn previous_month(&mut self) {
        if let Some(prev) = self.current.checked_sub_months(Months::new(1)) {
            self.current = prev;
        }
    }

    pub fn has_entries(&self, date: NaiveDate, rides: &[Ride]) -> bool {
        rides
            .iter()
            .any(|ride| local_day(ride.end_time, self.offset) == date)
    }

    pub fn is_in_current_month(&self, date: NaiveDate) -> bool {
        date.year() == self.current.year() && date.month() == self.current.month()
    }

    pub fn month_title(&self) -> String {
        self.current.format("%B %Y").to_string()
    }

    /// Short weekday names in grid column order.
    pub fn weekday_symbols(&self) -> [&'static str; 7] {
        let mut symbols = [""; 7];
        let mut day = self.first_weekday;
        for symbol in symbols.iter_mut() {
            *symbol = match day {
                Weekday::Mon => "Mon",
                Weekday::Tue => "Tue",
                Weekday::Wed => "Wed",
                Weekday::Thu => "Thu",
                Weekday::Fri => "Fri",
                Weekday::Sat => "Sat",
                Weekday::Sun => "Sun",
            };
            day = day.succ();
        }
        symbols
    }
}
