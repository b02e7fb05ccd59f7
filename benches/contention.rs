use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

async fn connect(host: &str, port: u16, password: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname("frontdesk")
        .user("frontdesk")
        .password(password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// First night of the benchmark calendar, far enough out to never be "past".
fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2090, 1, 1).expect("valid date")
}

fn night(offset: u64) -> NaiveDate {
    base_date() + Days::new(offset)
}

struct Target {
    host: String,
    port: u16,
    password: String,
}

impl Target {
    async fn client(&self) -> tokio_postgres::Client {
        connect(&self.host, self.port, &self.password).await
    }
}

/// Fresh rooms with run-unique numbers, plus one guest.
async fn setup(client: &tokio_postgres::Client, n_rooms: usize) -> (Vec<Ulid>, Ulid) {
    let run = Ulid::new().to_string();
    let tag = &run[run.len() - 6..];
    let mut rooms = Vec::with_capacity(n_rooms);
    for i in 0..n_rooms {
        let id = Ulid::new();
        client
            .batch_execute(&format!(
                "INSERT INTO rooms (id, number, category, rate, capacity) VALUES ('{id}', 'B{tag}-{i}', 'Standard', 120, 2)"
            ))
            .await
            .unwrap();
        rooms.push(id);
    }

    let guest = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO guests (id, name, passport, phone) VALUES ('{guest}', 'Bench Guest', 'BENCH{tag}', NULL)"
        ))
        .await
        .unwrap();

    println!("  created {} rooms and 1 guest", rooms.len());
    (rooms, guest)
}

fn booking_sql(guest: Ulid, room: Ulid, from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "INSERT INTO bookings (id, guest_id, room_id, check_in, check_out) VALUES ('{}', '{guest}', '{room}', '{from}', '{to}')",
        Ulid::new()
    )
}

async fn phase1_sequential(target: &Target, room: Ulid, guest: Ulid) {
    let client = target.client().await;
    let n = 300;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n as u64 {
        let sql = booking_sql(guest, room, night(i), night(i + 1));
        let t = Instant::now();
        client.batch_execute(&sql).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Many clients race for the same nights on the same room. Exactly one
/// booking per contested stay may win.
async fn phase2_contended(target: &Target, room: Ulid, guest: Ulid) {
    let n_tasks = 16;
    let n_stays = 50u64;

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let host = target.host.clone();
        let port = target.port;
        let password = target.password.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &password).await;
            let mut won = 0u64;
            let mut lost = 0u64;
            for s in 0..n_stays {
                let sql = booking_sql(guest, room, night(2 * s), night(2 * s + 2));
                match client.batch_execute(&sql).await {
                    Ok(()) => won += 1,
                    Err(e) if e.code().map(|c| c.code()) == Some("23P01") => lost += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            (won, lost)
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for h in handles {
        let (w, l) = h.await.unwrap();
        won += w;
        lost += l;
    }

    let elapsed = start.elapsed();
    let total = n_tasks as u64 * n_stays;
    println!(
        "  {n_tasks} clients x {n_stays} stays = {total} attempts in {:.2}s ({:.0} ops/sec)",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    println!("  won={won} rejected={lost}");
    assert_eq!(won, n_stays, "each contested stay must have exactly one winner");
}

/// Disjoint rooms, one client each: measures the per-room locking fan-out.
async fn phase3_parallel_rooms(target: &Target, rooms: &[Ulid], guest: Ulid) {
    let n_per_task = 100u64;

    let start = Instant::now();
    let mut handles = Vec::new();
    for &room in rooms {
        let host = target.host.clone();
        let port = target.port;
        let password = target.password.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &password).await;
            for j in 0..n_per_task {
                client
                    .batch_execute(&booking_sql(guest, room, night(j), night(j + 1)))
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = rooms.len() as u64 * n_per_task;
    println!(
        "  {} rooms x {n_per_task} bookings = {total} total in {:.2}s = {:.0} ops/sec",
        rooms.len(),
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
}

async fn phase4_availability_under_load(target: &Target, room: Ulid, guest: Ulid) {
    let writer = {
        let host = target.host.clone();
        let port = target.port;
        let password = target.password.clone();
        tokio::spawn(async move {
            let client = connect(&host, port, &password).await;
            for j in 0..300u64 {
                let _ = client
                    .batch_execute(&booking_sql(guest, room, night(1000 + j), night(1001 + j)))
                    .await;
            }
        })
    };

    let client = target.client().await;
    let (from, to) = (night(1100), night(1103));
    let sql = format!(
        "SELECT * FROM availability WHERE check_in >= '{from}' AND check_out <= '{to}'"
    );
    let mut latencies = Vec::new();
    while !writer.is_finished() {
        let t = Instant::now();
        client.simple_query(&sql).await.unwrap();
        latencies.push(t.elapsed());
    }
    writer.await.unwrap();
    print_latency("availability latency", &mut latencies);
}

#[tokio::main]
async fn main() {
    let target = Target {
        host: std::env::var("FRONTDESK_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
        port: std::env::var("FRONTDESK_PORT")
            .unwrap_or_else(|_| "5433".into())
            .parse()
            .expect("invalid FRONTDESK_PORT"),
        password: std::env::var("FRONTDESK_PASSWORD").unwrap_or_else(|_| "frontdesk".into()),
    };

    println!("=== frontdesk contention benchmark ===");
    println!("target: {}:{}\n", target.host, target.port);

    println!("[setup]");
    let setup_client = target.client().await;
    let (rooms, guest) = setup(&setup_client, 10).await;
    drop(setup_client);

    println!("\n[phase 1] sequential bookings on one room");
    phase1_sequential(&target, rooms[0], guest).await;

    println!("\n[phase 2] contended bookings on one room");
    phase2_contended(&target, rooms[1], guest).await;

    println!("\n[phase 3] parallel bookings across rooms");
    phase3_parallel_rooms(&target, &rooms[2..9], guest).await;

    println!("\n[phase 4] availability reads under write load");
    phase4_availability_under_load(&target, rooms[9], guest).await;

    println!("\n=== benchmark complete ===");
}
