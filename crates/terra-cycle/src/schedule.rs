use terra_core::{TerraError, TerraResult};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Daily window during which the display is powered.
///
/// `start == end` means always on. A window whose end is earlier than its
/// start wraps past midnight (22:00-07:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySchedule {
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
}

impl DisplaySchedule {
    pub fn new(start_hour: u32, start_minute: u32, end_hour: u32, end_minute: u32) -> TerraResult<Self> {
        if start_hour > 23 || end_hour > 23 || start_minute > 59 || end_minute > 59 {
            return Err(TerraError::InvalidConfig);
        }
        Ok(Self {
            start_hour: start_hour as u8,
            start_minute: start_minute as u8,
            end_hour: end_hour as u8,
            end_minute: end_minute as u8,
        })
    }

    /// Parse `HH:MM-HH:MM`.
    pub fn parse(text: &str) -> TerraResult<Self> {
        let (start, end) = text.trim().split_once('-').ok_or(TerraError::InvalidConfig)?;
        let (sh, sm) = parse_clock(start)?;
        let (eh, em) = parse_clock(end)?;
        Self::new(sh, sm, eh, em)
    }

    fn start(&self) -> u16 {
        self.start_hour as u16 * 60 + self.start_minute as u16
    }

    fn end(&self) -> u16 {
        self.end_hour as u16 * 60 + self.end_minute as u16
    }

    pub fn is_active(&self, minute_of_day: u16) -> bool {
        let (start, end) = (self.start(), self.end());
        if start == end {
            true
        } else if start < end {
            (start..end).contains(&minute_of_day)
        } else {
            minute_of_day >= start || minute_of_day < end
        }
    }
}

fn parse_clock(text: &str) -> TerraResult<(u32, u32)> {
    let (h, m) = text.trim().split_once(':').ok_or(TerraError::InvalidConfig)?;
    let h = h.parse().map_err(|_| TerraError::InvalidConfig)?;
    let m = m.parse().map_err(|_| TerraError::InvalidConfig)?;
    Ok((h, m))
}

/// Local minute of the day for an epoch timestamp.
pub fn minute_of_day(epoch: u32, utc_offset_secs: i32) -> u16 {
    let local = (epoch as i64 + utc_offset_secs as i64).rem_euclid(SECONDS_PER_DAY);
    (local / 60) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let s = DisplaySchedule::parse("07:30-22:00").unwrap();
        assert_eq!(s, DisplaySchedule { start_hour: 7, start_minute: 30, end_hour: 22, end_minute: 0 });

        assert!(DisplaySchedule::parse("24:00-01:00").is_err());
        assert!(DisplaySchedule::parse("07:30").is_err());
        assert!(DisplaySchedule::parse("aa:bb-cc:dd").is_err());
    }

    #[test]
    fn test_wrapping_window() {
        let night = DisplaySchedule::parse("22:00-07:00").unwrap();
        assert!(night.is_active(23 * 60));
        assert!(night.is_active(0));
        assert!(!night.is_active(7 * 60));
        assert!(!night.is_active(12 * 60));
    }

    #[test]
    fn test_minute_of_day_offset() {
        // 1970-01-02 00:30 UTC
        let epoch = 86_400 + 30 * 60;
        assert_eq!(minute_of_day(epoch, 0), 30);
        assert_eq!(minute_of_day(epoch, 3600), 90);
        assert_eq!(minute_of_day(epoch, -3600), 23 * 60 + 30);
    }
}
