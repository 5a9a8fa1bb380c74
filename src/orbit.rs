use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ThermalError};
use crate::math::Vec3;

/// Standard gravitational parameter of Earth, km^3/s^2 — used to derive the
/// orbital period from the semi-major axis via Kepler's third law.
const EARTH_MU: f64 = 398600.4415;

/// The columns this crate reads out of an orbit-propagator report, after
/// translating satellite-prefixed names to their internal short form
/// (`Sat.X`, `BetaAngle`, ...).
struct RawReportTable {
    sat_x: Vec<f64>,
    sat_y: Vec<f64>,
    sat_z: Vec<f64>,
    elapsed_secs: Vec<f64>,
    sun_position: Vec3,
    beta_angle_deg: f64,
    utc_epoch: String,
    sma_km: f64,
}

/// Time-indexed sun/satellite positions and derived orbital scalars, parsed
/// from a propagator report plus an eclipse locator report.
pub struct OrbitReport {
    /// (elapsed_sec, satellite position) samples, truncated to one period.
    pub sat_positions: Vec<(f64, Vec3)>,
    pub sun_position: Vec3,
    pub beta_angle_deg: f64,
    pub period_s: f64,
    /// `None` when the eclipse report names no umbra event inside the
    /// simulated interval — downstream serializes this as (-1, -1).
    pub eclipse: Option<(f64, f64)>,
}

impl OrbitReport {
    pub fn parse(report_path: impl AsRef<Path>, eclipse_path: impl AsRef<Path>) -> Result<Self> {
        let report_path = report_path.as_ref();
        let eclipse_path = eclipse_path.as_ref();

        let table = parse_report_file(report_path)?;
        let (eclipse, period_s) =
            parse_eclipse_locator(eclipse_path, table.sma_km, &table.utc_epoch)?;

        let sat_positions: Vec<(f64, Vec3)> = table
            .elapsed_secs
            .iter()
            .zip(table.sat_x.iter())
            .zip(table.sat_y.iter())
            .zip(table.sat_z.iter())
            .filter(|(((&t, _), _), _)| t < period_s)
            .map(|(((&t, &x), &y), &z)| (t, Vec3::new(x, y, z)))
            .collect();

        Ok(Self {
            sat_positions,
            sun_position: table.sun_position,
            beta_angle_deg: table.beta_angle_deg,
            period_s,
            eclipse,
        })
    }
}

/// Splits a line on runs of ≥ 2 spaces (the report's column delimiter),
/// trimming and dropping empty fields.
fn split_line(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0usize;
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b' ' && i + 1 < bytes.len() && bytes[i + 1] == b' ' {
            let field = line[start..i].trim();
            if !field.is_empty() {
                fields.push(field);
            }
            while i < bytes.len() && bytes[i] == b' ' {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    let tail = line[start..].trim();
    if !tail.is_empty() {
        fields.push(tail);
    }
    fields
}

/// Finds the satellite's column prefix: whichever header token ends in
/// `.EarthMJ2000Eq.X` and does not start with `Sun`.
fn satellite_prefix<'a>(header: &[&'a str]) -> Option<&'a str> {
    header.iter().find_map(|&field| {
        if field.ends_with("EarthMJ2000Eq.X") && !field.starts_with("Sun") {
            field.split('.').next()
        } else {
            None
        }
    })
}

fn translate_header(header: &[&str], sat: &str) -> HashMap<String, usize> {
    let mut translation = HashMap::new();
    translation.insert(format!("{sat}.EarthMJ2000Eq.X"), "Sat.X");
    translation.insert(format!("{sat}.EarthMJ2000Eq.Y"), "Sat.Y");
    translation.insert(format!("{sat}.EarthMJ2000Eq.Z"), "Sat.Z");
    translation.insert("Sun.EarthMJ2000Eq.X".to_string(), "Sun.X");
    translation.insert("Sun.EarthMJ2000Eq.Y".to_string(), "Sun.Y");
    translation.insert("Sun.EarthMJ2000Eq.Z".to_string(), "Sun.Z");
    translation.insert(format!("{sat}.Earth.BetaAngle"), "BetaAngle");
    translation.insert(format!("{sat}.UTCGregorian"), "UTC");
    translation.insert(format!("{sat}.Earth.SMA"), "SMA");
    translation.insert(format!("{sat}.Earth.Altitude"), "Sat.Altitude");
    translation.insert(format!("{sat}.ElapsedSecs"), "ElapsedSecs");

    let mut idx_from_param = HashMap::new();
    for (idx, field) in header.iter().enumerate() {
        let internal = translation
            .get(*field)
            .copied()
            .unwrap_or(*field);
        idx_from_param.insert(internal.to_string(), idx);
    }
    idx_from_param
}

const REQUIRED_COLUMNS: [&str; 7] = [
    "Sat.X",
    "Sat.Y",
    "Sat.Z",
    "Sun.X",
    "Sun.Y",
    "Sun.Z",
    "ElapsedSecs",
];

fn parse_report_file(path: &Path) -> Result<RawReportTable> {
    let bad = |line: usize, reason: String| ThermalError::BadOrbit {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let text = fs::read_to_string(path).map_err(|source| ThermalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = text.lines();
    let header_line = lines.next().ok_or_else(|| bad(0, "empty report file".into()))?;
    let header = split_line(header_line);
    let sat = satellite_prefix(&header)
        .ok_or_else(|| bad(1, "no satellite EarthMJ2000Eq.X column found".into()))?
        .to_string();
    let idx_from_param = translate_header(&header, &sat);

    for required in REQUIRED_COLUMNS.iter().chain(["BetaAngle", "UTC", "SMA", "Sat.Altitude"].iter()) {
        if !idx_from_param.contains_key(*required) {
            return Err(bad(1, format!("missing required column {required}")));
        }
    }

    let mut sat_x = Vec::new();
    let mut sat_y = Vec::new();
    let mut sat_z = Vec::new();
    let mut elapsed_secs = Vec::new();
    let mut sun_x = None;
    let mut sun_y = None;
    let mut sun_z = None;
    let mut beta_angle_deg = None;
    let mut utc_epoch = None;
    let mut sma_km = None;

    let parse_field = |line_no: usize, fields: &[&str], name: &str| -> Result<f64> {
        let idx = idx_from_param[name];
        fields
            .get(idx)
            .ok_or_else(|| bad(line_no, format!("row too short for column {name}")))?
            .parse::<f64>()
            .map_err(|_| bad(line_no, format!("non-numeric value for column {name}")))
    };

    for (row_idx, line) in lines.enumerate() {
        let line_no = row_idx + 2;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(line);
        sat_x.push(parse_field(line_no, &fields, "Sat.X")?);
        sat_y.push(parse_field(line_no, &fields, "Sat.Y")?);
        sat_z.push(parse_field(line_no, &fields, "Sat.Z")?);
        elapsed_secs.push(parse_field(line_no, &fields, "ElapsedSecs")?);

        if sun_x.is_none() {
            sun_x = Some(parse_field(line_no, &fields, "Sun.X")?);
            sun_y = Some(parse_field(line_no, &fields, "Sun.Y")?);
            sun_z = Some(parse_field(line_no, &fields, "Sun.Z")?);
            beta_angle_deg = Some(parse_field(line_no, &fields, "BetaAngle")?);
            sma_km = Some(parse_field(line_no, &fields, "SMA")?);
            let utc_idx = idx_from_param["UTC"];
            utc_epoch = Some(
                fields
                    .get(utc_idx)
                    .ok_or_else(|| bad(line_no, "row too short for UTC column".into()))?
                    .to_string(),
            );
        }
    }

    if sat_x.is_empty() {
        return Err(bad(1, "report has no data rows".into()));
    }

    Ok(RawReportTable {
        sat_x,
        sat_y,
        sat_z,
        elapsed_secs,
        sun_position: Vec3::new(sun_x.unwrap(), sun_y.unwrap(), sun_z.unwrap()),
        beta_angle_deg: beta_angle_deg.unwrap(),
        utc_epoch: utc_epoch.unwrap(),
        sma_km: sma_km.unwrap(),
    })
}

/// Scans an eclipse-locator report for the first `Event Number == 2` row of
/// `Type == "Umbra"`, returning its (start, finish) in seconds relative to
/// `utc_epoch`, plus the orbital period derived from the semi-major axis.
/// Absent such a row, returns `(None, period)`.
fn parse_eclipse_locator(
    path: &Path,
    sma_km: f64,
    utc_epoch: &str,
) -> Result<(Option<(f64, f64)>, f64)> {
    let bad = |line: usize, reason: String| ThermalError::BadOrbit {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let text = fs::read_to_string(path).map_err(|source| ThermalError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let period = 2.0 * std::f64::consts::PI * (sma_km.powi(3) / EARTH_MU).sqrt();

    let mut lines = text.lines().enumerate();
    let header_line = loop {
        match lines.next() {
            Some((_, line)) if line.starts_with("Start Time") => break Some(line),
            Some(_) => continue,
            None => break None,
        }
    };
    let Some(header_line) = header_line else {
        return Ok((None, period));
    };

    let header = split_line(header_line);
    let idx_of = |name: &str| -> Result<usize> {
        header
            .iter()
            .position(|&f| f == name)
            .ok_or_else(|| bad(0, format!("eclipse locator missing column {name}")))
    };
    let start_idx = idx_of("Start Time (UTC)")?;
    let stop_idx = idx_of("Stop Time (UTC)")?;
    let type_idx = idx_of("Type")?;
    let event_idx = idx_of("Event Number")?;

    let epoch = parse_gmat_datetime(utc_epoch)
        .ok_or_else(|| bad(0, format!("could not parse UTC epoch {utc_epoch:?}")))?;

    for (line_no, line) in lines {
        if line.len() <= 1 || line.starts_with("Number of") {
            break;
        }
        let fields = split_line(line);
        if fields.len() <= type_idx.max(event_idx).max(start_idx).max(stop_idx) {
            continue;
        }
        if fields[type_idx] == "Umbra" && fields[event_idx] == "2" {
            let start = parse_gmat_datetime(fields[start_idx])
                .ok_or_else(|| bad(line_no, "could not parse eclipse start time".into()))?;
            let finish = parse_gmat_datetime(fields[stop_idx])
                .ok_or_else(|| bad(line_no, "could not parse eclipse stop time".into()))?;

            let mut start_secs = start - epoch;
            let finish_secs = (finish - epoch) - period;
            if start_secs > period {
                start_secs -= period;
            }
            return Ok((Some((start_secs, finish_secs)), period));
        }
    }

    Ok((None, period))
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parses the one fixed timestamp shape this report format ever emits:
/// `"DD Mon YYYY HH:MM:SS[.fff]"`, e.g. `"01 Jan 2000 00:00:00.000"`.
/// Returns seconds since an arbitrary but fixed epoch (day 0 = 1970-01-01),
/// which is all the eclipse-window arithmetic needs — only differences
/// between two of these timestamps are ever taken.
fn parse_gmat_datetime(s: &str) -> Option<f64> {
    let s = s.trim();
    let mut parts = s.split_whitespace();
    let day: i64 = parts.next()?.parse().ok()?;
    let month_name = parts.next()?;
    let month = MONTHS.iter().position(|m| *m == month_name)? as i64 + 1;
    let year: i64 = parts.next()?.parse().ok()?;
    let time = parts.next()?;
    let mut time_parts = time.split(':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: f64 = time_parts.next()?.parse().ok()?;

    let days = days_from_civil(year, month, day);
    Some(days as f64 * 86400.0 + hour as f64 * 3600.0 + minute as f64 * 60.0 + second)
}

/// Howard Hinnant's `days_from_civil`: days since 1970-01-01 for a proleptic
/// Gregorian calendar date. Used only to difference two timestamps in
/// seconds, so any fixed epoch works.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64; // [0, 399]
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + d - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146097 + doe - 719468
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("thermal_vf_test_{name}_{}", std::process::id()));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn split_line_drops_short_runs_of_single_spaces() {
        let fields = split_line("Sat.X  Sat.Y  Sat.Z   ElapsedSecs");
        assert_eq!(fields, vec!["Sat.X", "Sat.Y", "Sat.Z", "ElapsedSecs"]);
    }

    #[test]
    fn gmat_datetime_parses_fixed_format() {
        let t = parse_gmat_datetime("01 Jan 2000 00:00:00.000").unwrap();
        let t2 = parse_gmat_datetime("02 Jan 2000 00:00:00.000").unwrap();
        assert!((t2 - t - 86400.0).abs() < 1e-6);
    }

    #[test]
    fn report_file_round_trips_basic_columns() {
        let report = "Sat.EarthMJ2000Eq.X  Sat.EarthMJ2000Eq.Y  Sat.EarthMJ2000Eq.Z  Sun.EarthMJ2000Eq.X  Sun.EarthMJ2000Eq.Y  Sun.EarthMJ2000Eq.Z  Sat.Earth.BetaAngle  Sat.UTCGregorian  Sat.Earth.SMA  Sat.Earth.Altitude  Sat.ElapsedSecs\n\
7000  0  0  25212844.34650287  -132968705.362406  -57648316.13335131  -23.07197787367823  01 Jan 2000 00:00:00.000  7000  621.8637000177523  0\n\
6436.596020641517  2749.0033407397  -0.1119942899460718  25212844.34650287  -132968705.362406  -57648316.13335131  -23.07197787367823  01 Jan 2000 00:00:00.000  7000  621.8637000177523  5900\n";
        let path = write_temp("report", report);
        let table = parse_report_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(table.sat_x, vec![7000.0, 6436.596020641517]);
        assert_eq!(table.elapsed_secs, vec![0.0, 5900.0]);
        assert!((table.sma_km - 7000.0).abs() < 1e-9);
        assert!((table.beta_angle_deg + 23.07197787367823).abs() < 1e-9);
    }

    #[test]
    fn eclipse_locator_returns_no_eclipse_when_absent() {
        let locator = "Some preamble\nmore preamble\n\
Start Time (UTC)  Stop Time (UTC)  Type  Event Number  Duration  Total Duration (s)\n";
        let path = write_temp("eclipse_none", locator);
        let (eclipse, period) = parse_eclipse_locator(&path, 7000.0, "01 Jan 2000 00:00:00.000").unwrap();
        fs::remove_file(&path).ok();
        assert!(eclipse.is_none());
        assert!((period - 5828.5).abs() < 1.0);
    }

    #[test]
    fn eclipse_locator_finds_the_second_umbra_event() {
        let locator = "preamble\n\
Start Time (UTC)  Stop Time (UTC)  Type  Event Number  Duration  Total Duration (s)\n\
01 Jan 2000 00:00:00.000  01 Jan 2000 00:05:00.000  Umbra  1  300  300\n\
01 Jan 2000 02:09:54.200  01 Jan 2000 02:53:57.500  Umbra  2  2643.3  2643.3\n\
Number of Events: 2\n";
        let path = write_temp("eclipse_some", locator);
        let (eclipse, period) = parse_eclipse_locator(&path, 7000.0, "01 Jan 2000 00:00:00.000").unwrap();
        fs::remove_file(&path).ok();
        let (start, finish) = eclipse.unwrap();
        assert!((period - 5828.5).abs() < 1.0);
        assert!(start > 0.0);
        assert!(finish > start - period);
    }
}
