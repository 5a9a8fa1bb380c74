//! # thermal-vf
//!
//! Monte Carlo radiative view-factor preprocessor for spacecraft thermal
//! analysis. Given a triangulated mesh, a per-element material/condition
//! assignment, and an orbit trajectory sampled over time, computes the
//! element↔element, element↔Earth (IR + albedo), and element↔Sun view
//! factors a downstream transient heat solver needs, and packs them into a
//! fixed-point binary file.
//!
//! ## Pipeline
//!
//! ```text
//!   mesh.vtk ──┐
//!              ├─► look_at(sun_dir) ─► BVH ─► kernels ─► view_factors.vf
//!   orbit ─────┤                                  │
//!   properties ┘                                  └─► properties.json (orbit fields appended)
//! ```

mod bvh;
mod codec;
mod error;
mod kernels;
mod math;
mod mesh;
mod orbit;
mod orbit_division;
mod properties;
mod sampling;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_json::Value;

use bvh::Bvh;
use codec::{write_view_factors, TimestampedVector, ViewFactorFile};
use error::{Result, ThermalError};
use mesh::Mesh;
use orbit::OrbitReport;
use orbit_division::run_orbit_divisions;
use properties::PropertiesDocument;

/// thermal-vf — Monte Carlo radiative view-factor preprocessor
#[derive(Parser, Debug)]
#[command(
    name = "thermal-vf",
    version,
    about = "Monte Carlo radiative view-factor preprocessor for spacecraft thermal analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full view-factor pipeline over a scenario directory.
    Process {
        /// Directory containing mesh.vtk, properties.json, and the orbit reports.
        dir: PathBuf,
    },
    /// Launch an interactive 3D visualization of the mesh colored by material.
    Viewm {
        dir: PathBuf,
    },
    /// Launch an interactive 3D visualization colored by normal-facing side.
    Viewn {
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let err = ThermalError::BadArguments(e.to_string());
            eprintln!("error: {err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    let result = match cli.command {
        Command::Process { dir } => run_process(&dir),
        Command::Viewm { dir: _ } => Err(ThermalError::ViewerUnavailable(
            "no display backend is linked into this build".into(),
        )),
        Command::Viewn { dir: _ } => Err(ThermalError::ViewerUnavailable(
            "no display backend is linked into this build".into(),
        )),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn required_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(ThermalError::MissingFile(path));
    }
    Ok(path)
}

/// Finds the one file in `dir` whose name contains `needle` (the orbit
/// report and eclipse locator file names are not fixed, only their
/// substrings are).
fn file_containing(dir: &Path, needle: &str) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|source| ThermalError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ThermalError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_name().to_string_lossy().contains(needle) {
            return Ok(entry.path());
        }
    }
    Err(ThermalError::MissingFile(dir.join(format!("*{needle}*"))))
}

/// A Unicode progress bar rendered to stderr with percentage, ETA, and a
/// block-character fill — the teacher's own `ProgressBar`, generalized from
/// "pixels done" to "emitter elements done".
struct ProgressBar {
    total: u32,
    done: u32,
    last_pct: u32,
    start: Instant,
}

impl ProgressBar {
    fn new(total: u32) -> Self {
        Self {
            total,
            done: 0,
            last_pct: 0,
            start: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.done += 1;
        let pct = self.done * 100 / self.total.max(1);
        if pct != self.last_pct {
            let elapsed = self.start.elapsed().as_secs_f64();
            let rate = self.done as f64 / elapsed.max(1e-9);
            let remaining = (self.total - self.done) as f64 / rate.max(1e-9);
            let bar_width = 24;
            let filled = (pct as usize * bar_width) / 100;
            let empty = bar_width - filled;
            let bar = format!("{}{}", "█".repeat(filled), "░".repeat(empty));
            eprint!("\r  element\u{2194}element: │{bar}│ {pct:3}%  ETA {:.0}s   ", remaining);
            self.last_pct = pct;
        }
    }

    fn finish(&self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let bar = "█".repeat(24);
        eprintln!("\r  element\u{2194}element: │{bar}│ 100%  {:.2}s       ", elapsed);
    }
}

/// Box-drawn run summary, printed once the full pipeline completes —
/// mirrors the teacher's `RenderStats::print_summary`.
fn print_summary(dir: &Path, elements: usize, orbit_divisions: usize, elapsed_secs: f64) {
    let fill = "━".repeat(30);
    eprintln!("  {fill}");
    eprintln!("  Time:     {elapsed_secs:.2}s");
    eprintln!("  Scenario: {}", dir.display());
    eprintln!("  Elements: {elements}");
    eprintln!("  Orbit:    {orbit_divisions} divisions");
    eprintln!("  {fill}");
}

fn global_usize(doc: &PropertiesDocument, properties_path: &Path, key: &str) -> Result<usize> {
    doc.global_properties
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| ThermalError::BadProperties {
            path: properties_path.to_path_buf(),
            reason: format!("global_properties.{key} missing or not a non-negative integer"),
        })
}

fn run_process(dir: &Path) -> Result<()> {
    let pipeline_start = Instant::now();
    eprintln!("  thermal-vf — processing {}", dir.display());
    log::info!("starting process of view factors in {}", dir.display());

    let mesh_path = required_file(dir, "mesh.vtk")?;
    let properties_path = required_file(dir, "properties.json")?;
    let report_path = file_containing(dir, "ReportFile")?;
    let eclipse_path = file_containing(dir, "EclipseLocator")?;

    log::info!("loading mesh");
    let mut mesh = Mesh::load(&mesh_path)?;

    log::info!("loading properties");
    let properties_doc = PropertiesDocument::load(&properties_path)?;
    let atlas = properties_doc.build_atlas(mesh.element_count(), &properties_path)?;

    let element_ray_amount = global_usize(&properties_doc, &properties_path, "element_ray_amount")?;
    let element_max_reflections_amount =
        global_usize(&properties_doc, &properties_path, "element_max_reflections_amount")?;
    let earth_ray_amount = global_usize(&properties_doc, &properties_path, "earth_ray_amount")?;
    let orbit_divisions = global_usize(&properties_doc, &properties_path, "orbit_divisions")?;

    log::info!("parsing orbit report");
    let orbit = OrbitReport::parse(&report_path, &eclipse_path)?;
    if orbit_divisions > orbit.sat_positions.len() {
        return Err(ThermalError::TooFewOrbitSamples {
            requested: orbit_divisions,
            available: orbit.sat_positions.len(),
        });
    }
    let sun_dir = orbit.sun_position.normalized();

    log::info!("setting up celestial bodies");
    mesh.look_at(sun_dir);
    let bvh = Bvh::build(&mesh);

    let mut rng = SmallRng::from_entropy();

    log::info!("calculating element-element ir view factors");
    let t0 = Instant::now();
    let mut progress = ProgressBar::new(mesh.element_count() as u32);
    let element_element_matrix = kernels::element_element(
        &mesh,
        &bvh,
        &atlas,
        element_ray_amount,
        element_max_reflections_amount,
        &mut rng,
        |_done, _total| progress.tick(),
    );
    progress.finish();
    log::info!("element-element pass took {:.2}s", t0.elapsed().as_secs_f64());

    log::info!("calculating sun view factors");
    let sun_vf = kernels::element_sun(&mesh, &bvh, sun_dir);
    let sun_stream = vec![TimestampedVector {
        timestamp_s: orbit.sat_positions.first().map_or(0.0, |(t, _)| *t as f32),
        values: sun_vf,
    }];

    log::info!("calculating earth view factors across {orbit_divisions} orbit divisions");
    let divisions = run_orbit_divisions(&mesh, &bvh, &orbit, orbit_divisions, earth_ray_amount, &mut rng)?;
    let earth_ir_stream: Vec<TimestampedVector> = divisions
        .iter()
        .map(|s| TimestampedVector {
            timestamp_s: s.timestamp_s as f32,
            values: s.vf_ir.clone(),
        })
        .collect();
    let earth_albedo_stream: Vec<TimestampedVector> = divisions
        .iter()
        .map(|s| TimestampedVector {
            timestamp_s: s.timestamp_s as f32,
            values: s.vf_albedo.clone(),
        })
        .collect();

    log::info!("writing output files");
    properties_doc
        .with_orbit_fields(&orbit)
        .dump(&properties_path)?;

    let vf_file = ViewFactorFile {
        earth_ir: earth_ir_stream,
        earth_albedo: earth_albedo_stream,
        sun: sun_stream,
        element_element: element_element_matrix,
    };
    write_view_factors(dir.join("view_factors.vf"), &vf_file)?;

    print_summary(dir, mesh.element_count(), orbit_divisions, pipeline_start.elapsed().as_secs_f64());
    log::info!("done");
    Ok(())
}
