use std::fs;
use std::path::Path;
use std::time::Duration;

use terra_core::{Layout, Slot, TerraError, STORE_COOKIE};
use terra_hal::{EnvironmentSensor, PlatformClock, Publisher};
use terra_linux::setup::{self, BackendKind, CookieState, EEPROM_SIZE};
use terra_linux::{LogPublisher, SimulatedSensor, SystemClock};

#[test]
fn test_backend_kind_parse() {
    assert_eq!("eeprom".parse::<BackendKind>(), Ok(BackendKind::Eeprom));
    assert_eq!("RTC".parse::<BackendKind>(), Ok(BackendKind::Retained));
    assert!("sdcard".parse::<BackendKind>().is_err());
    assert_eq!(BackendKind::Retained.to_string(), "retained");
}

#[test]
fn test_eeprom_store_persists_between_opens() {
    let test_dir = "./test_linux_setup";
    let _ = fs::remove_dir_all(test_dir);
    let image = Path::new(test_dir).join("eeprom.bin");

    {
        let mut store = setup::open_store(BackendKind::Eeprom, &image).unwrap();
        assert_eq!(store.begin(), Ok(false));
        store.set_slot(Slot::LastMeasure, 1_700_000_000).unwrap();
    }
    assert_eq!(fs::metadata(&image).unwrap().len(), EEPROM_SIZE as u64);

    {
        let mut store = setup::open_store(BackendKind::Eeprom, &image).unwrap();
        assert_eq!(store.begin(), Ok(true));
        assert_eq!(store.get_slot(Slot::LastMeasure), Ok(1_700_000_000));
    }
    let _ = fs::remove_dir_all(test_dir);
}

#[test]
fn test_cookie_state_classify() {
    assert_eq!(CookieState::classify(STORE_COOKIE, Layout::EEPROM), CookieState::Valid);
    assert_eq!(CookieState::classify(0xFFFF, Layout::EEPROM), CookieState::Erased);
    assert_eq!(CookieState::classify(0, Layout::EEPROM), CookieState::Foreign(0));
    // 0xFFFF is a foreign value on a word-wide cookie.
    assert_eq!(CookieState::classify(0xFFFF, Layout::RETAINED), CookieState::Foreign(0xFFFF));
    assert_eq!(CookieState::classify(u32::MAX, Layout::RETAINED), CookieState::Erased);
}

#[test]
fn test_cookie_state_follows_first_write() {
    let test_dir = "./test_linux_cookie";
    let _ = fs::remove_dir_all(test_dir);
    let image = Path::new(test_dir).join("eeprom.bin");

    let mut store = setup::open_store(BackendKind::Eeprom, &image).unwrap();
    store.begin().unwrap();
    let before = store.stored_cookie().unwrap();
    assert_eq!(CookieState::classify(before, Layout::EEPROM), CookieState::Erased);

    store.set_slot(Slot::DeviceId, 5).unwrap();
    let after = store.stored_cookie().unwrap();
    assert_eq!(CookieState::classify(after, Layout::EEPROM), CookieState::Valid);

    store.erase().unwrap();
    let reset = store.stored_cookie().unwrap();
    assert_eq!(CookieState::classify(reset, Layout::EEPROM), CookieState::Foreign(0));
    let _ = fs::remove_dir_all(test_dir);
}

#[test]
fn test_retained_store_starts_cold() {
    let mut store = setup::open_store(BackendKind::Retained, Path::new("unused.bin")).unwrap();
    assert_eq!(store.begin(), Ok(false));
    assert_eq!(store.get_slot(Slot::DeviceId), Err(TerraError::NotInitialized));
    assert!(!Path::new("unused.bin").exists());
}

#[test]
fn test_simulated_sensor() {
    let mut sensor = SimulatedSensor::seeded(1, 21.0, true);
    for _ in 0..10 {
        let m = sensor.read().unwrap();
        assert!((17.0..25.0).contains(&m.temperature_c));
        assert!(m.humidity_pct.is_some());
    }

    let mut faulty = SimulatedSensor::seeded(2, 21.0, false).with_fault_rate(1.0);
    assert_eq!(faulty.read(), Err(TerraError::SensorFailure));
}

#[test]
fn test_log_publisher_counts() {
    let mut bus = LogPublisher::new();
    bus.publish("ha/sensor/tempsensor/status", b"{\"temperature\":20.00}").unwrap();
    assert_eq!(bus.published(), 1);
    assert_eq!(bus.publish("t", &[0xFF, 0xFE]), Err(TerraError::PublishFailure));
}

#[test]
fn test_clock_waits_for_sync() {
    let clock = SystemClock::with_sync_delay(Duration::from_secs(3600));
    assert_eq!(clock.now_epoch(), None);
    assert!(SystemClock::new().now_epoch().is_some());
}
