use devsim_proto::{Heartbeat, SerialNumber};
use rand::Rng;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

pub const BOOT_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// Synthesizes one random reading for `sn`, stamped with the current UTC time.
pub fn simulate_heartbeat(sn: &SerialNumber) -> Result<Heartbeat, time::error::Format> {
    simulate_heartbeat_with(&mut rand::rng(), sn, OffsetDateTime::now_utc())
}

pub fn simulate_heartbeat_with<R: Rng>(
    rng: &mut R,
    sn: &SerialNumber,
    now: OffsetDateTime,
) -> Result<Heartbeat, time::error::Format> {
    Ok(Heartbeat {
        device_sn: sn.clone(),
        cpu_usage: round2(rng.random_range(0.0..=100.0)),
        ram_usage: round2(rng.random_range(0.0..=100.0)),
        disk_free: round2(rng.random_range(0.0..=100.0)),
        temperature: round2(rng.random_range(20.0..=80.0)),
        latency: rng.random_range(10..=200),
        connectivity: u8::from(rng.random_bool(0.5)),
        boot_time: now.to_offset(time::UtcOffset::UTC).format(BOOT_TIME_FORMAT)?,
    })
}

#[inline]
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
