/// Width of one hour bucket in seconds.
pub const HOUR: i64 = 3600;

/// Inclusive unix-time range requested for one city.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Hour boundaries from `start` to `end` inclusive.
    pub fn hours(&self) -> impl Iterator<Item = i64> {
        let end = self.end;
        std::iter::successors(Some(self.start), |dt| Some(dt + HOUR))
            .take_while(move |dt| *dt <= end)
    }

    /// Nothing left to fetch: the resume point already sits on the last hour.
    pub fn is_up_to_date(&self) -> bool {
        self.start == self.end - (HOUR - 1)
    }
}

/// Coordinates used to address one city upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct CityTarget {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// A city together with the window to fetch for it this run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncWindow {
    pub city: CityTarget,
    pub window: Window,
}

/// Latest stored hour of a city, as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CityResume {
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub last_hour: i64,
}

/// One normalized hourly observation, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRow {
    pub city: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
    pub timezone_offset: Option<i64>,
    pub dt: i64,
    pub temp: Option<f64>,
    pub description: Option<String>,
    pub wind_speed: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_one_hour_short_of_end_is_up_to_date() {
        let end = 10 * HOUR - 1;
        assert!(Window::new(end - 3599, end).is_up_to_date());
        assert!(!Window::new(end - 3599 - HOUR, end).is_up_to_date());
    }

    #[test]
    fn hours_are_inclusive_of_both_bounds() {
        let hours: Vec<_> = Window::new(0, 2 * HOUR).hours().collect();
        assert_eq!(hours, vec![0, HOUR, 2 * HOUR]);
        assert_eq!(Window::new(HOUR, 0).hours().count(), 0);
    }
}
