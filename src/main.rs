use anyhow::{Context, Result as R, bail};
use clap::Parser;
use memmap2::MmapOptions;
use std::io::Read;
use std::path::PathBuf;
use wavmark_lib::{
    MountError, MountFlags, SampleWav, commands, mount, serialise_to_vec,
};

/// Repair and author the sampler metadata of a WAVE file.
///
/// The sample is mounted, its cue/smpl/adtl metadata reconciled, optional
/// edits applied, and the result written back in a canonical chunk order.
#[derive(Parser)]
#[command(name = "wavmark", version)]
struct Args {
    /// Drop all known non-essential metadata chunks on load
    #[arg(long)]
    reset: bool,

    /// Carry chunks this tool does not understand through to the output
    #[arg(long)]
    preserve_unknown_chunks: bool,

    /// On a loop conflict, trust the sampler chunk (beware!)
    #[arg(long, conflicts_with = "prefer_cue_loops")]
    prefer_smpl_loops: bool,

    /// On a loop conflict, trust the cue chunk
    #[arg(long)]
    prefer_cue_loops: bool,

    /// Delete the textual metadata attached to loops and cue points
    #[arg(long)]
    strip_event_metadata: bool,

    /// Mirror loops into the cue chunk for editors that cannot read smpl
    #[arg(long)]
    write_cue_loops: bool,

    /// Dump the final metadata to stdout in --input-metadata form
    #[arg(long)]
    output_metadata: bool,

    /// Read metadata command lines from stdin, as if passed to --set
    #[arg(long)]
    input_metadata: bool,

    /// Apply a metadata command (may be repeated)
    #[arg(long, value_name = "CMD")]
    set: Vec<String>,

    /// Write the updated sample to this file
    #[arg(long, value_name = "FILE", conflicts_with = "output_inplace")]
    output: Option<PathBuf>,

    /// Rewrite the input file with the updated sample
    #[arg(long)]
    output_inplace: bool,

    /// The wave file to operate on
    input: PathBuf,
}

/// The one load failure worth a detailed report: which loops agree and
/// which side each leftover loop came from.
fn dump_conflicts(wav: &SampleWav) {
    eprintln!("common loops (position/duration):");
    for m in wav.markers.iter().filter(|m| m.in_cue && m.in_smpl && m.length > 0) {
        eprintln!("  {}/{}", m.position, m.length);
    }
    eprintln!("sampler loops (position/duration):");
    for m in wav.markers.iter().filter(|m| !m.in_cue && m.in_smpl && m.length > 0) {
        eprintln!("  {}/{}", m.position, m.length);
    }
    eprintln!("cue loops (position/duration):");
    for m in wav.markers.iter().filter(|m| m.in_cue && !m.in_smpl && m.length > 0) {
        eprintln!("  {}/{}", m.position, m.length);
    }
}

fn main() -> R<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("could not open {}", args.input.display()))?;
    let map = unsafe { MmapOptions::new().map(&file)? };

    let mut flags = MountFlags::empty();
    flags.set(MountFlags::RESET, args.reset);
    flags.set(MountFlags::PRESERVE_UNKNOWN, args.preserve_unknown_chunks);
    flags.set(MountFlags::PREFER_SMPL_LOOPS, args.prefer_smpl_loops);
    flags.set(MountFlags::PREFER_CUE_LOOPS, args.prefer_cue_loops);

    let (mut wav, warnings) = match mount(&map, flags) {
        Ok(mounted) => mounted,
        Err(MountError::SmplCueLoopConflicts(wav)) => {
            eprintln!(
                "{} has sampler loops that conflict with loops in the cue chunk. specify \
                 --prefer-smpl-loops or --prefer-cue-loops to load it. here are the details:",
                args.input.display()
            );
            dump_conflicts(&wav);
            bail!("unresolvable loop conflicts");
        }
        Err(e) => bail!("failed to load '{}': {}", args.input.display(), e),
    };
    if !warnings.is_empty() {
        log::warn!("loaded with compromises: {warnings:?}");
    }

    if args.strip_event_metadata {
        for m in &mut wav.markers {
            m.name = None;
            m.desc = None;
        }
    }

    if args.input_metadata {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("error reading from stdin")?;
        for line in text.lines().filter(|line| !line.is_empty()) {
            let cmd = commands::parse(line).with_context(|| format!("in line '{line}'"))?;
            commands::apply(&mut wav, cmd).with_context(|| format!("in line '{line}'"))?;
        }
    }

    for item in &args.set {
        let cmd = commands::parse(item).with_context(|| format!("in --set '{item}'"))?;
        commands::apply(&mut wav, cmd).with_context(|| format!("in --set '{item}'"))?;
    }

    wav.sort_markers();

    if args.output_metadata {
        commands::dump(&wav, &mut std::io::stdout().lock())?;
    }

    let output = if args.output_inplace { Some(args.input.clone()) } else { args.output.clone() };
    if let Some(path) = output {
        let data = serialise_to_vec(&wav, args.write_cue_loops)
            .context("can not serialise the updated waveform")?;
        // The output may be the mapped input file; let the map go first.
        drop(wav);
        drop(map);
        std::fs::write(&path, &data)
            .with_context(|| format!("could not write to {}", path.display()))?;
    }

    Ok(())
}
