use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;
use crate::{
    error::{ClockError, FaultKind},
    event::EventKind,
    time::{ManualTimeSource, TimeBase},
    universe::DEFAULT_UNIVERSE,
};

// --------------------------------------------------------------------------------------------------
// helpers

fn new_scheduler(time: &ManualTimeSource) -> Scheduler {
    Scheduler::new(
        SchedulerConfig::default()
            .with_lookahead(Duration::ZERO)
            .with_tick_budget(Duration::from_secs(10))
            .with_seed(1),
        time.clone(),
        Vec::<ScheduledEvent>::new(),
    )
    .unwrap()
}

// run ticks every 10ms until the given time
fn run_until(scheduler: &mut Scheduler, time: &ManualTimeSource, until: f64) -> Vec<TickReport> {
    let mut reports = Vec::new();
    let mut now = time.now().unwrap();
    while now < until {
        now = (now + 0.01).min(until);
        time.set(now);
        reports.push(scheduler.tick());
    }
    reports
}

fn evaluated_pulses(reports: &[TickReport], kind: SlotKind) -> Vec<Pulse> {
    reports
        .iter()
        .flat_map(|report| report.evaluations.iter())
        .filter(|evaluation| evaluation.slot.kind == kind)
        .map(|evaluation| evaluation.pulse)
        .collect()
}

fn event_pulses(reports: &[TickReport], kind: SlotKind) -> Vec<Pulse> {
    reports
        .iter()
        .flat_map(|report| report.events())
        .filter(|event| event.source.kind == kind)
        .map(|event| event.pulse)
        .collect()
}

// --------------------------------------------------------------------------------------------------

#[test]
fn beats_at_120_bpm() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    scheduler
        .set_script(
            DEFAULT_UNIVERSE,
            SlotKind::Global,
            r#"if beat(1) then sound("kick"):out() end"#,
        )
        .unwrap();
    scheduler
        .set_script(
            DEFAULT_UNIVERSE,
            SlotKind::Local(1),
            r#"if beat(2) then sound("snare"):out() end"#,
        )
        .unwrap();
    scheduler.start().unwrap();
    let mut reports = vec![scheduler.tick()];
    reports.append(&mut run_until(&mut scheduler, &time, 1.5));

    assert_eq!(event_pulses(&reports, SlotKind::Global), vec![0, 24, 48, 72]);
    assert_eq!(event_pulses(&reports, SlotKind::Local(1)), vec![0, 48]);

    // events are stamped with the hardware time they are due
    let times = reports
        .iter()
        .flat_map(|report| report.events())
        .filter(|event| event.payload.kind == EventKind::Sound("kick".to_string()))
        .map(|event| event.time)
        .collect::<Vec<_>>();
    assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5]);
}

#[test]
fn lag_catch_up_without_skips() {
    let time = ManualTimeSource::new(10.0);
    let mut scheduler = new_scheduler(&time);
    scheduler
        .set_script(
            DEFAULT_UNIVERSE,
            SlotKind::Global,
            r#"if beat(1) then sound("kick"):out() end"#,
        )
        .unwrap();
    scheduler.start().unwrap();
    let mut reports = run_until(&mut scheduler, &time, 10.2);

    // a stall spanning several beat boundaries
    time.set(12.3);
    let report = scheduler.tick();
    assert_eq!(report.window, PulseWindow::new(10, 111));
    assert_eq!(
        report.events().map(|event| event.pulse).collect::<Vec<_>>(),
        vec![24, 48, 72, 96]
    );
    reports.push(report);
    reports.append(&mut run_until(&mut scheduler, &time, 13.0));

    // every pulse evaluated exactly once, in order
    let pulses = evaluated_pulses(&reports, SlotKind::Global);
    assert_eq!(pulses, (0..=144).collect::<Vec<_>>());
    assert_eq!(
        event_pulses(&reports, SlotKind::Global),
        vec![0, 24, 48, 72, 96, 120, 144]
    );
}

#[test]
fn global_faults_are_isolated() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Global, "error('broken')").unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Local(1), "sound('ok'):out()").unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Local(2), "if then").unwrap();
    scheduler.start().unwrap();
    let report = scheduler.tick();

    let faults = report.faults().collect::<Vec<_>>();
    assert_eq!(faults.len(), 2);
    assert_eq!(faults[0].slot.kind, SlotKind::Global);
    assert_eq!(faults[0].kind, FaultKind::Runtime);
    assert_eq!(faults[1].slot.kind, SlotKind::Local(2));
    assert_eq!(faults[1].kind, FaultKind::Compile);
    assert_eq!(event_pulses(&[report], SlotKind::Local(1)), vec![0]);

    let universe = scheduler.universes().selected();
    assert_eq!(universe.global.evaluations, 0);
    assert_eq!(universe.global.committed, "error('broken')");
    assert_eq!(universe.locals[&1].evaluations, 1);

    // the next ticks keep going
    let reports = run_until(&mut scheduler, &time, 0.1);
    assert_eq!(
        event_pulses(&reports, SlotKind::Local(1)),
        (1..=4).collect::<Vec<_>>()
    );
}

#[test]
fn counters_are_per_slot() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    scheduler
        .set_script(
            DEFAULT_UNIVERSE,
            SlotKind::Local(1),
            r#"sound("a"):n(counter("step")):out()"#,
        )
        .unwrap();
    scheduler
        .set_script(
            DEFAULT_UNIVERSE,
            SlotKind::Local(2),
            r#"if beat(1) then sound("b"):n(counter("step")):out() end"#,
        )
        .unwrap();
    scheduler.start().unwrap();
    let mut reports = vec![scheduler.tick()];
    reports.append(&mut run_until(&mut scheduler, &time, 1.0));

    let steps = |kind: SlotKind| {
        reports
            .iter()
            .flat_map(|report| report.events())
            .filter(|event| event.source.kind == kind)
            .filter_map(|event| event.payload.param("n").and_then(|n| n.as_number()))
            .collect::<Vec<_>>()
    };
    assert_eq!(steps(SlotKind::Local(1)), (0..=48).map(|n| n as f64).collect::<Vec<_>>());
    assert_eq!(steps(SlotKind::Local(2)), vec![0.0, 1.0, 2.0]);

    // deleting a script resets its counters
    scheduler.delete_script(DEFAULT_UNIVERSE, 1).unwrap();
    let universe = scheduler.universes().selected();
    assert_eq!(universe.locals[&1].counters.get("step"), 0);
    assert_eq!(universe.locals[&2].counters.get("step"), 3);
}

#[test]
fn pause_resume_and_stop() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = Scheduler::new(
        SchedulerConfig::default()
            .with_lookahead(Duration::from_millis(50))
            .with_seed(1),
        time.clone(),
        Vec::<ScheduledEvent>::new(),
    )
    .unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Global, "x = pulse()").unwrap();
    scheduler.start().unwrap();
    let mut reports = run_until(&mut scheduler, &time, 0.5);

    scheduler.pause().unwrap();
    assert_eq!(scheduler.clock().current_pulse(0.5), 24);
    // pulses covered by the look-ahead stay evaluated
    assert_eq!(scheduler.next_pulse(), 27);
    time.set(5.0);
    reports.push(scheduler.tick());
    assert!(reports.last().unwrap().window.is_empty());

    scheduler.start().unwrap();
    assert_eq!(scheduler.clock().current_pulse(5.0), 24);
    reports.append(&mut run_until(&mut scheduler, &time, 5.5));
    assert_eq!(
        evaluated_pulses(&reports, SlotKind::Global),
        (0..51).collect::<Vec<_>>()
    );

    // stopping rewinds to pulse 0
    scheduler.stop();
    assert_eq!(scheduler.next_pulse(), 0);
    scheduler.start().unwrap();
    let report = scheduler.tick();
    assert_eq!(report.window, PulseWindow::new(0, 3));
}

#[test]
fn init_runs_before_pulses() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    scheduler.set_script("Jungle", SlotKind::Init, "root = 36 bpm(160)").unwrap();
    scheduler.set_script("Jungle", SlotKind::Local(1), "midi(root):out()").unwrap();
    scheduler.select_universe("Jungle");
    scheduler.start().unwrap();
    let report = scheduler.tick();
    assert_eq!(report.evaluations[0].slot.kind, SlotKind::Init);
    assert_eq!(
        report.events().map(|event| &event.payload.kind).collect::<Vec<_>>(),
        vec![&EventKind::Midi(36.0)]
    );
    // tempo requests apply at the next tick boundary
    assert_eq!(scheduler.clock().time_base().beats_per_min, 120.0);
    scheduler.tick();
    assert_eq!(scheduler.clock().time_base().beats_per_min, 160.0);

    // the init script only runs once per selection
    time.set(0.1);
    let report = scheduler.tick();
    assert!(report
        .evaluations
        .iter()
        .all(|evaluation| evaluation.slot.kind != SlotKind::Init));
}

#[test]
fn script_requests() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Global, "script(5)").unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Local(3), "script(4)").unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Local(4), "script(3)").unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Local(5), "sound('x'):out()").unwrap();
    scheduler.start().unwrap();
    let report = scheduler.tick();
    assert_eq!(
        report
            .evaluations
            .iter()
            .map(|evaluation| evaluation.slot.kind)
            .collect::<Vec<_>>(),
        vec![
            SlotKind::Global,
            SlotKind::Local(5),
            SlotKind::Local(3),
            SlotKind::Local(4),
            SlotKind::Local(4),
            SlotKind::Local(3),
            SlotKind::Local(5),
        ]
    );
}

#[test]
fn commands_apply_at_tick_boundaries() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    let handle = scheduler.handle();
    handle
        .set_candidate(DEFAULT_UNIVERSE, SlotKind::Global, "sound('a'):out()")
        .unwrap();
    handle.commit(DEFAULT_UNIVERSE, SlotKind::Global).unwrap();
    handle.start().unwrap();
    assert!(!scheduler.clock().is_running());

    let report = scheduler.tick();
    assert!(scheduler.clock().is_running());
    assert_eq!(report.events().count(), 1);

    handle.set_tempo(-1.0).unwrap();
    handle
        .send(Command::CopyScript {
            universe: DEFAULT_UNIVERSE.to_string(),
            from: 1,
            to: 17,
        })
        .unwrap();
    handle.stop().unwrap();
    let report = scheduler.tick();
    assert!(matches!(
        report.diagnostics[0],
        Diagnostic::ClockFault(ClockError::InvalidTempo(_))
    ));
    assert!(matches!(report.diagnostics[1], Diagnostic::Command(_)));
    assert!(!scheduler.clock().is_running());
    assert!(report.window.is_empty());
}

#[test]
fn invalid_time_bases() {
    let time_bases = [
        TimeBase {
            beats_per_bar: 0,
            ..TimeBase::default()
        },
        TimeBase {
            pulses_per_quarter_note: 0,
            ..TimeBase::default()
        },
        TimeBase {
            beats_per_min: -120.0,
            ..TimeBase::default()
        },
    ];
    for time_base in time_bases {
        let result = Scheduler::new(
            SchedulerConfig::default().with_time_base(time_base),
            ManualTimeSource::new(0.0),
            Vec::<ScheduledEvent>::new(),
        );
        assert!(matches!(result, Err(Error::Clock(_))), "{time_base:?}");
    }

    // a valid, unusual meter works with bar based primitives
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = Scheduler::new(
        SchedulerConfig::default()
            .with_time_base(TimeBase {
                beats_per_bar: 1,
                pulses_per_quarter_note: 1,
                ..TimeBase::default()
            })
            .with_lookahead(Duration::ZERO),
        time.clone(),
        Vec::<ScheduledEvent>::new(),
    )
    .unwrap();
    scheduler
        .set_script(DEFAULT_UNIVERSE, SlotKind::Global, "if bar() then log(bar_count()) end")
        .unwrap();
    scheduler.start().unwrap();
    let reports = run_until(&mut scheduler, &time, 2.0);
    assert!(reports.iter().all(|report| report.faults().count() == 0));
    assert_eq!(evaluated_pulses(&reports, SlotKind::Global), vec![0, 1, 2, 3, 4]);
}

#[test]
fn local_slots_are_bounded() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    for index in [0, 17, 99] {
        assert!(matches!(
            scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Local(index), "sound('x'):out()"),
            Err(Error::InvalidSlot(_))
        ));
    }
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Global, "x = 1").unwrap();
    let handle = scheduler.handle();
    handle
        .set_candidate(DEFAULT_UNIVERSE, SlotKind::Local(99), "sound('x'):out()")
        .unwrap();
    handle.commit(DEFAULT_UNIVERSE, SlotKind::Local(99)).unwrap();
    scheduler.start().unwrap();
    let mut reports = run_until(&mut scheduler, &time, 0.05);
    assert!(matches!(reports[0].diagnostics[0], Diagnostic::Command(_)));
    assert!(matches!(reports[0].diagnostics[1], Diagnostic::Command(_)));
    reports.append(&mut run_until(&mut scheduler, &time, 0.1));
    assert!(evaluated_pulses(&reports, SlotKind::Local(99)).is_empty());
    assert_eq!(evaluated_pulses(&reports, SlotKind::Global), (0..=4).collect::<Vec<_>>());
    assert_eq!(scheduler.universes().selected().locals.len(), 16);
}

#[test]
fn clock_faults() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    time.set_available(false);
    assert!(matches!(
        scheduler.start(),
        Err(Error::Clock(ClockError::Unavailable(_)))
    ));
    assert!(!scheduler.clock().is_running());

    time.set_available(true);
    scheduler.start().unwrap();
    time.set_available(false);
    let report = scheduler.tick();
    assert!(matches!(report.diagnostics[0], Diagnostic::ClockFault(_)));
    assert!(report.window.is_empty());
    assert_eq!(scheduler.clock().current_pulse(0.0), 0);
}

#[test]
fn drift_never_rewinds() {
    let time = ManualTimeSource::new(1.0);
    let mut scheduler = new_scheduler(&time);
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Global, "x = 1").unwrap();
    scheduler.start().unwrap();
    let mut reports = run_until(&mut scheduler, &time, 2.0);

    // the hardware clock jumps back
    time.set(1.5);
    let report = scheduler.tick();
    assert!(matches!(report.diagnostics[0], Diagnostic::Drift { pulse: 48, .. }));
    assert!(report.window.is_empty());
    reports.push(report);
    reports.append(&mut run_until(&mut scheduler, &time, 2.0));

    assert_eq!(
        evaluated_pulses(&reports, SlotKind::Global),
        (0..=72).collect::<Vec<_>>()
    );
}

#[test]
fn overruns_are_reported() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = Scheduler::new(
        SchedulerConfig::default()
            .with_tick_budget(Duration::ZERO)
            .with_seed(1),
        time.clone(),
        Vec::<ScheduledEvent>::new(),
    )
    .unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Global, "for i = 1, 10000 do end").unwrap();
    scheduler.start().unwrap();
    let report = scheduler.tick();
    assert!(report
        .diagnostics
        .iter()
        .any(|diagnostic| matches!(diagnostic, Diagnostic::SchedulingOverrun { .. })));
    // overruns never abort a tick
    assert_eq!(report.evaluations.len(), report.window.len() as usize);
}

#[test]
fn channel_sink() {
    let time = ManualTimeSource::new(0.0);
    let (sender, receiver) = crossbeam_channel::unbounded::<ScheduledEvent>();
    let mut scheduler = Scheduler::new(
        SchedulerConfig::default().with_lookahead(Duration::ZERO),
        time.clone(),
        sender,
    )
    .unwrap();
    scheduler.set_script(DEFAULT_UNIVERSE, SlotKind::Local(16), "midi(60):vel(100):out()").unwrap();
    scheduler.start().unwrap();
    scheduler.tick();
    let event = receiver.try_recv().unwrap();
    assert_eq!(event.source, SlotId::new(DEFAULT_UNIVERSE, SlotKind::Local(16)));
    assert_eq!(event.pulse, 0);
    assert!(receiver.try_recv().is_err());
}

#[test]
fn universe_management() {
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = new_scheduler(&time);
    scheduler.set_script("A", SlotKind::Local(1), "sound('a'):out()").unwrap();
    scheduler.copy_universe("A", "B");
    scheduler.copy_script("B", 1, 2).unwrap();
    assert!(scheduler.copy_script("B", 1, 0).is_err());
    scheduler.select_universe("B");
    scheduler.start().unwrap();
    let report = scheduler.tick();
    assert_eq!(report.events().count(), 2);

    let json = scheduler.save_universes().unwrap();
    scheduler.delete_universe("B");
    assert_eq!(scheduler.universes().selected_name(), DEFAULT_UNIVERSE);
    scheduler.load_universes(&json, "B").unwrap();
    assert_eq!(scheduler.universes().selected_name(), "B");
    assert_eq!(scheduler.universes().selected().locals[&2].committed, "sound('a'):out()");

    scheduler.reset_all();
    assert_eq!(scheduler.universes().names().collect::<Vec<_>>(), vec![DEFAULT_UNIVERSE]);
}
