//! One-time startup seeding of an empty property.

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use crate::config::Config;
use crate::engine::{today, Engine, EngineError};

const ADMIN_USERNAME: &str = "admin";
const ADMIN_ROLE: &str = "ADMIN";

/// (number, category, nightly rate, capacity)
const SEED_ROOMS: [(&str, &str, f64, u32); 8] = [
    ("101", "Economy", 80.0, 1),
    ("102", "Economy", 80.0, 2),
    ("201", "Standard", 120.0, 2),
    ("202", "Standard", 120.0, 3),
    ("301", "Premium", 200.0, 2),
    ("302", "Premium", 200.0, 3),
    ("401", "Suite", 350.0, 2),
    ("402", "Suite", 350.0, 4),
];

/// (name, passport, phone)
const SEED_GUESTS: [(&str, &str, &str); 2] = [
    ("Ivan Petrov", "MP123456", "+375291112233"),
    ("Anna Sidorova", "MP654321", "+375333334455"),
];

const SEED_BOOKING_NIGHTS: u64 = 3;

/// What a bootstrap run added.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub rooms: usize,
    pub guests: usize,
    pub bookings: usize,
}

/// Seed each empty table with the default dataset. Called once by `main`
/// after replay; tables that already hold rows are left alone.
pub async fn initialize(engine: &Engine, config: &Config) -> Result<SeedReport, EngineError> {
    if !config.seed {
        return Ok(SeedReport::default());
    }
    seed(engine, &config.admin_password, today()).await
}

pub async fn seed(
    engine: &Engine,
    admin_password: &str,
    today: NaiveDate,
) -> Result<SeedReport, EngineError> {
    let mut report = SeedReport::default();

    if engine.user_count() == 0 {
        engine
            .create_user(Ulid::new(), ADMIN_USERNAME, admin_password, ADMIN_ROLE)
            .await?;
        report.users = 1;
    }

    if engine.list_rooms().await.is_empty() {
        for (number, category, rate, capacity) in SEED_ROOMS {
            engine
                .save_room(Ulid::new(), number, category, rate, capacity)
                .await?;
            report.rooms += 1;
        }
    }

    if engine.list_guests().is_empty() {
        for (name, passport, phone) in SEED_GUESTS {
            engine
                .save_guest(Ulid::new(), name, passport, Some(phone))
                .await?;
            report.guests += 1;
        }
    }

    if engine.list_bookings().await.is_empty() {
        let room = engine.list_rooms().await.into_iter().next();
        let guest = engine
            .list_guests()
            .into_iter()
            .find(|g| g.passport == SEED_GUESTS[0].1);
        if let (Some(room), Some(guest)) = (room, guest) {
            let check_in = today.checked_add_days(Days::new(1));
            let check_out = today.checked_add_days(Days::new(1 + SEED_BOOKING_NIGHTS));
            engine
                .create_booking_at(Ulid::new(), guest.id, room.id, check_in, check_out, today)
                .await?;
            report.bookings = 1;
        }
    }

    if report != SeedReport::default() {
        tracing::info!(
            "seeded {} users, {} rooms, {} guests, {} bookings",
            report.users,
            report.rooms,
            report.guests,
            report.bookings
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookingStatus;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("frontdesk_test_bootstrap");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn seeds_empty_store() {
        let engine = Engine::new(test_wal_path("seed_empty.wal")).unwrap();
        let today = d(2030, 3, 10);
        let report = seed(&engine, "admin123", today).await.unwrap();
        assert_eq!(
            report,
            SeedReport {
                users: 1,
                rooms: 8,
                guests: 2,
                bookings: 1
            }
        );

        assert!(engine.login("admin", "admin123").await);
        let rooms = engine.list_rooms().await;
        let numbers: Vec<_> = rooms.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, ["101", "102", "201", "202", "301", "302", "401", "402"]);
        assert_eq!(rooms[7].rate, 350.0);
        assert_eq!(rooms[7].capacity, 4);

        let bookings = engine.list_bookings().await;
        assert_eq!(bookings.len(), 1);
        let b = &bookings[0];
        assert_eq!(b.room_number, "101");
        assert_eq!(b.guest_name.as_deref(), Some("Ivan Petrov"));
        assert_eq!(b.check_in, d(2030, 3, 11));
        assert_eq!(b.check_out, d(2030, 3, 14));
        assert_eq!(b.nights, 3);
        assert_eq!(b.status, BookingStatus::Booked);
    }

    #[tokio::test]
    async fn second_run_adds_nothing() {
        let path = test_wal_path("seed_twice.wal");
        let today = d(2030, 3, 10);
        {
            let engine = Engine::new(path.clone()).unwrap();
            seed(&engine, "admin123", today).await.unwrap();
        }
        let engine = Engine::new(path).unwrap();
        let report = seed(&engine, "admin123", today).await.unwrap();
        assert_eq!(report, SeedReport::default());
        assert_eq!(engine.list_rooms().await.len(), 8);
        assert_eq!(engine.list_guests().len(), 2);
    }

    #[tokio::test]
    async fn only_empty_tables_are_seeded() {
        let engine = Engine::new(test_wal_path("seed_partial.wal")).unwrap();
        engine
            .save_room(Ulid::new(), "999", "Annex", 50.0, 1)
            .await
            .unwrap();
        let report = seed(&engine, "admin123", d(2030, 3, 10)).await.unwrap();
        assert_eq!(report.rooms, 0);
        assert_eq!(report.guests, 2);
        assert_eq!(engine.list_rooms().await.len(), 1);
        assert_eq!(engine.list_bookings().await[0].room_number, "999");
    }

    #[tokio::test]
    async fn disabled_seed_does_nothing() {
        let engine = Engine::new(test_wal_path("seed_off.wal")).unwrap();
        let config = Config {
            seed: false,
            ..Config::default()
        };
        assert_eq!(initialize(&engine, &config).await.unwrap(), SeedReport::default());
        assert!(engine.list_rooms().await.is_empty());
    }
}
