use field_sim::tags::engine::SimulationEngine;
use field_sim::tags::structures::{DataType, TagSpec};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn create_sample_spec(index: usize) -> TagSpec {
    let data_type = match index % 4 {
        0 => DataType::Bool,
        1 => DataType::Int,
        2 => DataType::Real,
        _ => DataType::String,
    };
    TagSpec::new(
        &format!("PERF-{:06}", index),
        &format!("Performance tag {}", index),
        &format!("plc-{}", index % 10),
        &format!("DB{}.DBD{}", index % 100 + 1, (index % 64) * 4),
        data_type,
    )
}

#[test]
fn test_tag_registration_performance() {
    let engine = SimulationEngine::with_seed(1);
    let tag_count = 20_000;

    let start = Instant::now();
    for i in 0..tag_count {
        engine.add_tag(create_sample_spec(i));
    }
    let registration_time = start.elapsed();
    let tags_per_second = tag_count as f64 / registration_time.as_secs_f64();

    println!(
        "Registered {} tags in {:?} ({:.0} tags/sec)",
        tag_count, registration_time, tags_per_second
    );

    assert!(tags_per_second > 2_000.0);
    assert_eq!(engine.tag_count(), tag_count);
}

#[test]
fn test_tick_performance() {
    let engine = SimulationEngine::with_seed(2);
    let tag_count = 5_000;
    for i in 0..tag_count {
        engine.add_tag(create_sample_spec(i));
    }

    let ticks = 20;
    let start = Instant::now();
    for _ in 0..ticks {
        assert_eq!(engine.tick().len(), tag_count);
    }
    let tick_time = start.elapsed();
    let updates_per_second = (tag_count * ticks) as f64 / tick_time.as_secs_f64();

    println!(
        "{} ticks over {} tags in {:?} ({:.0} updates/sec)",
        ticks, tag_count, tick_time, updates_per_second
    );

    assert!(updates_per_second > 10_000.0);
}

#[test]
fn test_fan_out_with_many_subscribers() {
    let engine = SimulationEngine::with_seed(3);
    for i in 0..500 {
        engine.add_tag(create_sample_spec(i));
    }

    let delivered = Arc::new(AtomicUsize::new(0));
    let subscriptions: Vec<_> = (0..100)
        .map(|_| {
            let counter = Arc::clone(&delivered);
            engine.subscribe(move |tags| {
                counter.fetch_add(tags.len(), Ordering::Relaxed);
            })
        })
        .collect();

    let start = Instant::now();
    for _ in 0..10 {
        engine.tick();
    }
    println!("10 ticks to 100 subscribers in {:?}", start.elapsed());

    // One immediate snapshot per subscriber plus ten ticks each.
    assert_eq!(delivered.load(Ordering::Relaxed), 100 * 11 * 500);
    drop(subscriptions);
    assert_eq!(engine.subscriber_count(), 0);
}

#[test]
fn test_concurrent_read_performance() {
    let engine = SimulationEngine::with_seed(4);
    let tag_count = 2_000;
    for i in 0..tag_count {
        engine.add_tag(create_sample_spec(i));
    }

    let thread_count = 4;
    let reads_per_thread = 20_000;
    let start = Instant::now();

    let handles: Vec<_> = (0..thread_count)
        .map(|t| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..reads_per_thread {
                    let id = format!("PERF-{:06}", (i * 7 + t) % tag_count);
                    assert!(engine.get_tag(&id).is_some());
                }
            })
        })
        .collect();

    let ticker = {
        let engine = engine.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                engine.tick();
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    ticker.join().unwrap();

    let elapsed = start.elapsed();
    let reads_per_second = (thread_count * reads_per_thread) as f64 / elapsed.as_secs_f64();
    println!(
        "{} concurrent reads in {:?} ({:.0} reads/sec)",
        thread_count * reads_per_thread,
        elapsed,
        reads_per_second
    );
    assert!(reads_per_second > 20_000.0);
}

#[test]
fn test_history_generation_performance() {
    let engine = SimulationEngine::with_seed(5);
    engine.add_tag(create_sample_spec(2));

    let start = Instant::now();
    let points = engine.generate_historical_data("PERF-000002", 24 * 7, 60);
    println!("Generated {} history points in {:?}", points.len(), start.elapsed());

    assert_eq!(points.len(), 24 * 7 * 60);
    assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}
