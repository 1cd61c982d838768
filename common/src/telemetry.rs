/// DS18B20 reading returned when the probe is absent or the conversion
/// failed; also what the bus reads back with a shorted data line.
pub const DISCONNECTED_C: f32 = -127.0;

/// Operating range of the DS18B20 part.
const MIN_VALID_C: f32 = -55.0;
const MAX_VALID_C: f32 = 125.0;

/// Edge-triggered fixed-interval publish timer.
///
/// `due` fires on the first call and whenever a full interval has elapsed
/// since the last firing. The next window is measured from the firing
/// moment, so drift accumulates by loop latency; fine for thermostat-grade
/// sampling.
#[derive(Debug, Clone)]
pub struct TelemetryScheduler {
    interval_ms: u64,
    last_fire_ms: Option<u64>,
}

impl TelemetryScheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fire_ms: None,
        }
    }

    pub fn due(&mut self, now_ms: u64) -> bool {
        let fire = match self.last_fire_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        };
        if fire {
            self.last_fire_ms = Some(now_ms);
        }
        fire
    }
}

/// Cayenne value payload for the temperature gauge channel.
pub fn format_temperature(celsius: f32) -> String {
    format!("temp,c={celsius:.2}")
}

/// Whether a Celsius reading can have come from a working probe. Rules out
/// the disconnected sentinel, NaN/infinities, and values outside the part's
/// range.
pub fn is_plausible(celsius: f32) -> bool {
    celsius.is_finite() && (MIN_VALID_C..=MAX_VALID_C).contains(&celsius)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn formats_with_two_decimal_digits() {
        assert_eq!(format_temperature(21.5), "temp,c=21.50");
        assert_eq!(format_temperature(-3.0), "temp,c=-3.00");
        assert_eq!(format_temperature(0.0), "temp,c=0.00");
    }

    #[test]
    fn first_tick_fires_immediately() {
        let mut scheduler = TelemetryScheduler::new(2_000);
        assert!(scheduler.due(4_321));
    }

    #[test]
    fn fires_at_most_once_per_interval() {
        let mut scheduler = TelemetryScheduler::new(2_000);
        assert!(scheduler.due(0));

        // Sub-interval ticks never fire.
        for now in (100..2_000).step_by(300) {
            assert!(!scheduler.due(now));
        }

        assert!(scheduler.due(2_000));
        assert!(!scheduler.due(2_100));
        assert!(scheduler.due(4_500));
    }

    #[test]
    fn window_restarts_from_the_firing_moment() {
        let mut scheduler = TelemetryScheduler::new(2_000);
        assert!(scheduler.due(0));
        assert!(scheduler.due(5_000));
        // 5_000 fired, so 6_500 is still inside the new window.
        assert!(!scheduler.due(6_500));
        assert!(scheduler.due(7_000));
    }

    #[test]
    fn disconnected_sentinel_is_not_plausible() {
        assert!(!is_plausible(DISCONNECTED_C));
        assert!(!is_plausible(f32::NAN));
        assert!(!is_plausible(f32::INFINITY));
        assert!(!is_plausible(-80.0));
        assert!(!is_plausible(130.0));
    }

    #[test]
    fn room_temperatures_are_plausible() {
        assert!(is_plausible(21.5));
        assert!(is_plausible(-3.0));
        assert!(is_plausible(0.0));
    }
}
