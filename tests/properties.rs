mod common;

use common::{Log, on_start, sleeper};
use proptest::prelude::*;
use scopeline::inspect::EventKind;
use scopeline::{Operation, Runtime, Step};

fn scope(names: Vec<String>, log: &Log) -> Operation {
    let log = log.clone();
    Operation::iterator(on_start(move |task| {
        for name in &names {
            task.spawn(sleeper(name, &log));
        }
        Step::Yield(Operation::suspend())
    }))
}

/// A tree where every node spawns `width` children down to `depth`.
fn tree(depth: u32, width: usize, log: &Log) -> Operation {
    if depth == 0 {
        return sleeper("leaf", log);
    }
    let log = log.clone();
    Operation::iterator(on_start(move |task| {
        for _ in 0..width {
            task.spawn(tree(depth - 1, width, &log));
        }
        Step::Yield(Operation::suspend())
    }))
}

proptest! {
    #[test]
    fn halt_runs_teardown_in_reverse_spawn_order(count in 1usize..8) {
        let rt = Runtime::new();
        let log = Log::new();
        let names: Vec<String> = (0..count).map(|i| format!("child{i}")).collect();

        let task = rt.spawn(scope(names.clone(), &log));
        rt.run().unwrap();
        task.halt();
        rt.run().unwrap();

        let expected: Vec<String> = names.iter().rev().map(|n| format!("{n} teardown")).collect();
        prop_assert_eq!(log.entries(), expected);
    }

    #[test]
    fn every_task_settles_after_its_children(depth in 1u32..4, width in 1usize..4, halts in 1usize..3) {
        let rt = Runtime::new();
        let log = Log::new();

        let task = rt.spawn(tree(depth, width, &log));
        rt.run().unwrap();
        for _ in 0..halts {
            task.halt();
        }
        rt.run().unwrap();

        let events = rt.events();
        let settled: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Completed | EventKind::Errored | EventKind::Halted))
            .collect();

        for (position, event) in settled.iter().enumerate() {
            let later_child = settled[position + 1..]
                .iter()
                .any(|other| other.parent_id == Some(event.task_id));
            prop_assert!(!later_child, "a child of {} settled after it", event.task_id);
        }

        let leaves = width.pow(depth);
        prop_assert_eq!(log.entries().len(), leaves);
        prop_assert_eq!(rt.live_tasks(), 1);
    }
}
