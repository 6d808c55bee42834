use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use notify::{RecursiveMode, Watcher};
use simplelog::*;

use cadence::prelude::*;

// -------------------------------------------------------------------------------------------------

const DEMO_PATH: &str = "./demos/assets";

// -------------------------------------------------------------------------------------------------

// Map a script file name to its slot: `init.lua`, `global.lua`, `notes.lua` or `local_N.lua`.
fn slot_kind_from_path(path: &Path) -> Option<SlotKind> {
    if path.extension()? != "lua" {
        return None;
    }
    match path.file_stem()?.to_str()? {
        "init" => Some(SlotKind::Init),
        "global" => Some(SlotKind::Global),
        "notes" => Some(SlotKind::Notes),
        stem => {
            let index = stem.strip_prefix("local_")?.parse::<usize>().ok()?;
            SlotKind::local(index).ok()
        }
    }
}

// (Re)load all scripts from the demo path into the selected universe.
fn load_scripts(scheduler: &mut Scheduler) -> anyhow::Result<()> {
    let universe = scheduler.universes().selected_name().to_string();
    for dir_entry in fs::read_dir(DEMO_PATH)?.flatten() {
        let path = dir_entry.path();
        if let Some(kind) = slot_kind_from_path(&path) {
            log::info!("Loading script '{}' into slot {}", path.display(), kind);
            scheduler.set_script(&universe, kind, fs::read_to_string(&path)?)?;
        }
    }
    Ok(())
}

// -------------------------------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // init logging
    TermLogger::init(
        log::LevelFilter::Info,
        ConfigBuilder::default().build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap_or_else(|err| {
        log::error!("init_logger error: {:?}", err);
    });

    // create a scheduler which prints all events
    let mut scheduler = Scheduler::new(
        SchedulerConfig::default().with_time_base(TimeBase {
            beats_per_min: 124.0,
            ..TimeBase::default()
        }),
        SystemTimeSource::new(),
        |event: ScheduledEvent| println!("{event}"),
    )?;
    log::info!("Using random seed {}", scheduler.seed());

    // watch for script changes, signaling in 'script_files_changed'
    let script_files_changed = Arc::new(AtomicBool::new(false));
    let mut watcher = notify::recommended_watcher({
        let script_files_changed = script_files_changed.clone();
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !event.kind.is_access() {
                    log::info!("File change event: {:?}", event);
                    script_files_changed.store(true, Ordering::Relaxed);
                }
            }
            Err(err) => log::error!("File watch error: {}", err),
        }
    })?;
    watcher.watch(Path::new(DEMO_PATH), RecursiveMode::Recursive)?;

    // stop on Control-C
    let stop_running = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let stop_running = stop_running.clone();
        move || {
            stop_running.store(true, Ordering::Relaxed);
        }
    })?;

    // (re)load all scripts and run until they change. The transport keeps running while reloading.
    scheduler.start()?;
    while !stop_running.load(Ordering::Relaxed) {
        if script_files_changed.swap(false, Ordering::Relaxed) {
            log::info!("Reloading all scripts...");
        }
        if let Err(err) = load_scripts(&mut scheduler) {
            log::error!("Failed to load scripts: {err}");
        }
        scheduler.run_until(
            || script_files_changed.load(Ordering::Relaxed) || stop_running.load(Ordering::Relaxed),
            |report| {
                for diagnostic in &report.diagnostics {
                    log::warn!("{diagnostic}");
                }
            },
        );
    }
    scheduler.stop();

    Ok(())
}
