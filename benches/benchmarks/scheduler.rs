use std::{hint::black_box, time::Duration};

use criterion::{criterion_group, Criterion};

use cadence::prelude::*;

// ---------------------------------------------------------------------------------------------

fn create_scheduler(time: &ManualTimeSource) -> Scheduler {
    let mut scheduler = Scheduler::new(
        SchedulerConfig::default()
            .with_lookahead(Duration::ZERO)
            .with_tick_budget(Duration::from_secs(60))
            .with_seed(0x1234),
        time.clone(),
        |event: ScheduledEvent| {
            black_box(event);
        },
    )
    .unwrap();
    let universe = scheduler.universes().selected_name().to_string();
    scheduler
        .set_script(&universe, SlotKind::Init, "notes = { 48, 51, 55, 58 }")
        .unwrap();
    scheduler
        .set_script(
            &universe,
            SlotKind::Global,
            r#"if beat() then sound("kick"):gain(0.8):out() end"#,
        )
        .unwrap();
    scheduler
        .set_script(
            &universe,
            SlotKind::Local(1),
            r#"if rhythm(0.25, 5, 16) then midi(cycle_beat(notes)):vel(irand(80, 120)):out() end"#,
        )
        .unwrap();
    scheduler
        .set_script(
            &universe,
            SlotKind::Local(2),
            r#"if flip(0.5, 30) then sound("hat"):n(counter("hat") % 4):pan(usine(4)):out() end"#,
        )
        .unwrap();
    scheduler
}

// ---------------------------------------------------------------------------------------------

pub fn tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scheduler");
    let time = ManualTimeSource::new(0.0);
    let mut scheduler = create_scheduler(&time);
    scheduler.start().unwrap();
    group.bench_function("Tick", |b| {
        b.iter(|| {
            // a single pulse per tick
            time.advance(1.0 / 48.0);
            black_box(scheduler.tick())
        })
    });
    group.finish();
}

pub fn catch_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scheduler");
    group.bench_function("Catch Up", |b| {
        let time = ManualTimeSource::new(0.0);
        let mut scheduler = create_scheduler(&time);
        scheduler.start().unwrap();
        b.iter(|| {
            // one bar worth of lagging pulses
            time.advance(2.0);
            black_box(scheduler.tick())
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------------------------

criterion_group! {
    name = scheduler;
    config = Criterion::default();
    targets = tick, catch_up
}
