mod common;

use common::{EventLog, init_tracing, prioritized, scripted};
use takt::{DelayOptions, Signal, Simulation};

/// An interruptible delay resumes when its signal arrives and reports the
/// elapsed virtual time, so the caller can compute the remaining delay.
#[tokio::test]
async fn interrupted_delay_reports_elapsed_time() -> anyhow::Result<()> {
    init_tracing();

    let sim = Simulation::default();
    let log = EventLog::new();

    {
        let log = log.clone();
        sim.activate(scripted(move |ctx| async move {
            let opts = DelayOptions {
                interrupt: Some(Signal::from("wake")),
                ..DelayOptions::default()
            };
            let elapsed = ctx.delay_with(100.0, opts).await?;
            log.push("woke", ctx.now());
            log.push("elapsed", elapsed);
            // The interrupted sleeper finishes out its remaining delay.
            ctx.delay(100.0 - elapsed).await?;
            log.push("done", ctx.now());
            Ok(())
        }))?;
    }
    sim.activate(scripted(move |ctx| async move {
        ctx.delay(30.0).await?;
        ctx.send_signal("wake", None);
        Ok(())
    }))?;

    sim.start(false).await?;

    assert_eq!(log.times_of("woke"), vec![30.0]);
    assert_eq!(log.times_of("elapsed"), vec![30.0]);
    assert_eq!(log.times_of("done"), vec![100.0]);
    Ok(())
}

/// An uninterrupted interruptible delay runs to its due time.
#[tokio::test]
async fn uninterrupted_delay_runs_to_due_time() -> anyhow::Result<()> {
    init_tracing();

    let sim = Simulation::default();
    let log = EventLog::new();

    {
        let log = log.clone();
        sim.activate(scripted(move |ctx| async move {
            let opts = DelayOptions {
                interrupt: Some(Signal::from("never")),
                ..DelayOptions::default()
            };
            let elapsed = ctx.delay_with(25.0, opts).await?;
            log.push("elapsed", elapsed);
            Ok(())
        }))?;
    }

    sim.start(false).await?;
    assert_eq!(log.times_of("elapsed"), vec![25.0]);
    assert_eq!(sim.now(), 25.0);
    Ok(())
}

/// `send_signal` releases exactly `min(max, matching waiters)` and returns
/// that count; the rest keep waiting.
#[tokio::test]
async fn send_signal_releases_up_to_max() -> anyhow::Result<()> {
    init_tracing();

    let sim = Simulation::default();
    let log = EventLog::new();

    for label in ["w1", "w2", "w3"] {
        let log = log.clone();
        sim.activate(scripted(move |ctx| async move {
            ctx.wait_signal("go").await?;
            log.push(label, ctx.now());
            Ok(())
        }))?;
    }
    {
        let log = log.clone();
        sim.activate(scripted(move |ctx| async move {
            ctx.wait_signal("other").await?;
            log.push("other", ctx.now());
            Ok(())
        }))?;
    }
    {
        let log = log.clone();
        sim.activate(scripted(move |ctx| async move {
            ctx.delay(2.0).await?;
            let released = ctx.send_signal("go", Some(2));
            log.push("released", released as f64);
            Ok(())
        }))?;
    }

    sim.start(false).await?;

    assert_eq!(log.times_of("released"), vec![2.0]);
    // First two waiters resumed in FEC order at t = 2; w3 and the
    // non-matching waiter stay parked, which ends the run.
    assert_eq!(log.times_of("w1"), vec![2.0]);
    assert_eq!(log.times_of("w2"), vec![2.0]);
    assert!(log.times_of("w3").is_empty());
    assert!(log.times_of("other").is_empty());
    assert!(sim.status().is_finished());
    Ok(())
}

/// Released signal waiters dispatch in FEC order, which priority biased at
/// insertion: the high-priority waiter resumes first.
#[tokio::test]
async fn signal_release_respects_priority_order() -> anyhow::Result<()> {
    init_tracing();

    let sim = Simulation::default();
    let log = EventLog::new();

    for (label, priority) in [("low", 0), ("high", 3)] {
        let log = log.clone();
        sim.activate(prioritized(priority, move |ctx| async move {
            ctx.wait_signal("open").await?;
            log.push(label, ctx.now());
            Ok(())
        }))?;
    }
    sim.activate(scripted(move |ctx| async move {
        ctx.delay(1.0).await?;
        assert_eq!(ctx.send_signal("open", None), 2);
        Ok(())
    }))?;

    sim.start(false).await?;

    assert_eq!(log.labels(), vec!["high".to_string(), "low".to_string()]);
    Ok(())
}

/// Signals are compared structurally across the whole sum type.
#[tokio::test]
async fn signals_match_by_value_not_kind() -> anyhow::Result<()> {
    init_tracing();

    let sim = Simulation::default();
    let log = EventLog::new();

    {
        let log = log.clone();
        sim.activate(scripted(move |ctx| async move {
            ctx.wait_signal(7).await?;
            log.push("int", ctx.now());
            Ok(())
        }))?;
    }
    sim.activate(scripted(move |ctx| async move {
        ctx.delay(1.0).await?;
        // A named signal "7" is not the integer 7.
        assert_eq!(ctx.send_signal("7", None), 0);
        assert_eq!(ctx.send_signal(7, None), 1);
        Ok(())
    }))?;

    sim.start(false).await?;
    assert_eq!(log.times_of("int"), vec![1.0]);
    Ok(())
}
