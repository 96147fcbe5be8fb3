//! `idmap` CLI: generate synthetic streams, consolidate identities, edit and
//! export autosaved sessions.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use identity_core::{spawn_load, IdentityGraph, Role, Session, SessionConfig, TrackId};
use sim::scenarios::{Scenario, ScenarioKind};
use sim::stream::{load_truth, save_truth, write_stream, GroundTruth};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Parser)]
#[command(name = "idmap", about = "Identity consolidation over tracker detections")]
struct Cli {
    /// JSON session config (fps, thresholds, history, cast)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic fragmented detection stream.
    Generate {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output stream (gzip NDJSON)
        #[arg(long)]
        output: PathBuf,
        /// Also write the ground-truth sidecar
        #[arg(long)]
        truth: Option<PathBuf>,
    },
    /// Load a stream, run the automatic passes and write the results.
    Process {
        /// Input stream (gzip NDJSON)
        input: PathBuf,
        /// Skip auto-stitch
        #[arg(long)]
        no_stitch: bool,
        /// Skip noise absorption
        #[arg(long)]
        no_absorb: bool,
        /// Write the consolidated session here
        #[arg(long)]
        autosave: Option<PathBuf>,
        /// Write the identity map here
        #[arg(long)]
        identity_map: Option<PathBuf>,
        /// Write the audit log here
        #[arg(long)]
        audit_log: Option<PathBuf>,
        /// Ground-truth sidecar to score against
        #[arg(long)]
        truth: Option<PathBuf>,
        /// Output metrics to a JSON file
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// List the tracks of an autosaved session.
    Summary {
        session: PathBuf,
        /// Include short un-roled tracks
        #[arg(long)]
        all: bool,
    },
    /// Merge tracks in an autosaved session (roles inherited).
    Merge {
        session: PathBuf,
        #[arg(required = true, num_args = 2..)]
        ids: Vec<u64>,
    },
    /// Split a track at a frame in an autosaved session.
    Split {
        session: PathBuf,
        id: u64,
        frame: u64,
        /// Keep the tail under the original id instead of the head
        #[arg(long)]
        keep_tail: bool,
    },
    /// Assign a role to tracks in an autosaved session ("Ignore" clears).
    Assign {
        session: PathBuf,
        role: String,
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    /// Merge every group of tracks sharing a role.
    MergeRoles { session: PathBuf },
    /// Export the identity map and audit log of an autosaved session.
    Export {
        session: PathBuf,
        #[arg(long)]
        identity_map: Option<PathBuf>,
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Generate {
            scenario,
            seed,
            output,
            truth,
        } => generate(scenario, seed, &output, truth.as_deref())?,
        Commands::Process {
            input,
            no_stitch,
            no_absorb,
            autosave,
            identity_map,
            audit_log,
            truth,
            metrics,
        } => {
            let session = Arc::new(Session::new(config));
            process(
                &session,
                &input,
                !no_stitch,
                !no_absorb,
                truth.as_deref(),
                metrics.as_deref(),
            )?;
            write_outputs(
                &session,
                autosave.as_deref(),
                identity_map.as_deref(),
                audit_log.as_deref(),
            )?;
        }
        Commands::Summary { session, all } => {
            let s = open(&session, config)?;
            print_summary(&s, all);
        }
        Commands::Merge { session: path, ids } => {
            let s = open(&path, config)?;
            let ids: Vec<TrackId> = ids.into_iter().map(TrackId).collect();
            match s.manual_merge(&ids)? {
                Some(master) => println!("Merged {} tracks into {master}", ids.len()),
                None => println!("Nothing to merge"),
            }
            s.autosave(&path)?;
        }
        Commands::Split {
            session: path,
            id,
            frame,
            keep_tail,
        } => {
            let s = open(&path, config)?;
            let out = s.split(TrackId(id), frame, !keep_tail)?;
            println!(
                "Split {id} at frame {frame}: new track {} with {} detections",
                out.new_id, out.new_len
            );
            s.autosave(&path)?;
        }
        Commands::Assign {
            session: path,
            role,
            ids,
        } => {
            let s = open(&path, config)?;
            let role = Role::from(role);
            if !role.is_ignore() && !s.cast().contains(&role) {
                s.add_cast_member(role.as_str());
            }
            let ids: Vec<TrackId> = ids.into_iter().map(TrackId).collect();
            let changed = s.assign_role(&ids, role.clone())?;
            println!("{changed} tracks set to {role}");
            s.autosave(&path)?;
        }
        Commands::MergeRoles { session: path } => {
            let s = open(&path, config)?;
            let report = s.merge_all_by_role();
            println!("Merged {} tracks across {} roles", report.merged, report.roles.len());
            s.autosave(&path)?;
        }
        Commands::Export {
            session,
            identity_map,
            audit_log,
        } => {
            if identity_map.is_none() && audit_log.is_none() {
                bail!("nothing to export: pass --identity-map and/or --audit-log");
            }
            let s = open(&session, config)?;
            write_outputs(&s, None, identity_map.as_deref(), audit_log.as_deref())?;
        }
    }

    Ok(())
}

fn open(path: &Path, config: SessionConfig) -> Result<Session> {
    let session = Session::new(config);
    session
        .restore_autosave(path)
        .with_context(|| format!("restoring session {}", path.display()))?;
    Ok(session)
}

fn generate(kind: ScenarioKind, seed: u64, output: &Path, truth_path: Option<&Path>) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    println!(
        "Generating scenario '{}' (seed={}, {} frames, {} subjects)...",
        scenario.name,
        seed,
        scenario.frames,
        scenario.targets.len()
    );
    let out = scenario.run();
    write_stream(&out.records, output)?;
    let detections: usize = out.records.iter().map(|r| r.det.len()).sum();
    println!(
        "Stream saved to {} ({} records, {} detections, {} tracker ids on subjects)",
        output.display(),
        out.records.len(),
        detections,
        out.truth.track_to_target.len()
    );
    if let Some(tpath) = truth_path {
        save_truth(&out.truth, tpath)?;
        println!("Ground truth saved to {}", tpath.display());
    }
    Ok(())
}

fn process(
    session: &Arc<Session>,
    input: &Path,
    stitch: bool,
    absorb: bool,
    truth_path: Option<&Path>,
    metrics_path: Option<&Path>,
) -> Result<()> {
    println!("Loading {}...", input.display());
    let start = std::time::Instant::now();
    let loaded = spawn_load(session.clone(), input.to_path_buf())
        .wait_with(|n| tracing::debug!(records = n, "loading"))
        .with_context(|| format!("loading {}", input.display()))?;
    println!(
        "Loaded {} records, {} detections, {} tracks ({} untracked detections)",
        loaded.records, loaded.detections, loaded.tracks, loaded.untracked
    );

    let stitched = if stitch { session.auto_stitch() } else { 0 };
    let absorbed = if absorb { session.absorb_noise() } else { 0 };
    let remaining = session.read(IdentityGraph::len);
    let elapsed = start.elapsed();
    println!(
        "Done: {stitched} stitched, {absorbed} absorbed, {remaining} tracks remain, elapsed={:.2}s",
        elapsed.as_secs_f64()
    );

    let score = match truth_path {
        Some(p) => {
            let truth = load_truth(p)?;
            let score = session.read(|g| score_against(g, &truth));
            println!(
                "Score: {} subjects, {:.2} tracks per subject, {} impure tracks",
                score.subjects, score.tracks_per_subject, score.impure_tracks
            );
            Some(score)
        }
        None => None,
    };

    if let Some(opath) = metrics_path {
        let json = serde_json::json!({
            "input": input.display().to_string(),
            "elapsed_s": elapsed.as_secs_f64(),
            "loaded_tracks": loaded.tracks,
            "stitched": stitched,
            "absorbed": absorbed,
            "final_tracks": remaining,
            "subjects": score.as_ref().map(|s| s.subjects),
            "tracks_per_subject": score.as_ref().map(|s| s.tracks_per_subject),
            "impure_tracks": score.as_ref().map(|s| s.impure_tracks),
        });
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", opath.display());
    }
    Ok(())
}

fn write_outputs(
    session: &Session,
    autosave: Option<&Path>,
    identity_map: Option<&Path>,
    audit_log: Option<&Path>,
) -> Result<()> {
    if let Some(p) = autosave {
        session.autosave(p)?;
        println!("Session saved to {}", p.display());
    }
    if let Some(p) = identity_map {
        let n = session.write_identity_map(p)?;
        println!("Identity map saved to {} ({n} ids)", p.display());
    }
    if let Some(p) = audit_log {
        session.write_audit_log(p)?;
        println!("Audit log saved to {}", p.display());
    }
    Ok(())
}

fn print_summary(session: &Session, all: bool) {
    let rows = if all {
        session.summaries()
    } else {
        session.visible_summaries()
    };
    println!(
        "{:>12} {:>8} {:>9} {:>8} {:>8}  {:<16} merged_from",
        "id", "dets", "secs", "first", "last", "role"
    );
    for r in &rows {
        let merged: Vec<String> = r.merged_from.iter().map(ToString::to_string).collect();
        println!(
            "{:>12} {:>8} {:>9.2} {:>8} {:>8}  {:<16} {}",
            r.id.to_string(),
            r.detections,
            r.duration_secs,
            r.first_frame.map_or_else(|| "-".into(), |f| f.to_string()),
            r.last_frame.map_or_else(|| "-".into(), |f| f.to_string()),
            r.role.as_str(),
            merged.join(",")
        );
    }
    let total = session.read(IdentityGraph::len);
    println!("{} of {} tracks shown", rows.len(), total);
}

/// How well the consolidated tracks line up with the ground truth.
struct Score {
    subjects: usize,
    tracks_per_subject: f64,
    impure_tracks: usize,
}

fn score_against(graph: &IdentityGraph, truth: &GroundTruth) -> Score {
    let mut per_track: BTreeMap<TrackId, BTreeSet<u64>> = BTreeMap::new();
    for (original, subject) in &truth.track_to_target {
        if let Some(live) = graph.resolve(TrackId(*original)) {
            per_track.entry(live).or_default().insert(*subject);
        }
    }
    let mut per_subject: BTreeMap<u64, usize> = BTreeMap::new();
    for subjects in per_track.values() {
        for s in subjects {
            *per_subject.entry(*s).or_default() += 1;
        }
    }
    let subjects = per_subject.len();
    let tracks_per_subject = if subjects == 0 {
        0.0
    } else {
        per_subject.values().sum::<usize>() as f64 / subjects as f64
    };
    Score {
        subjects,
        tracks_per_subject,
        impure_tracks: per_track.values().filter(|s| s.len() > 1).count(),
    }
}
