// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for workflow state persistence and the hot pure helpers.
//!
//! Run with: `cargo bench --bench state`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::path::PathBuf;
use tempfile::TempDir;

use adw::state::{StateManager, WorkflowState};
use adw::trinity::parse_plan_response;
use adw::worktree::{generate_id, ports_for};

const ID: &str = "a1b2c3d4";

fn manager_with_history(base: &std::path::Path, phases: usize) -> StateManager {
    let mut manager = StateManager::new(ID, base).unwrap();
    manager
        .initialize(
            WorkflowState::new(
                ID,
                42,
                PathBuf::from("trees").join(ID),
                format!("feat/issue-42-{ID}"),
                ports_for(ID).unwrap(),
            )
            .with_models("claude-opus-4-5-20251101", "gpt-4o", "gemini-2.0-flash-exp"),
        )
        .unwrap();
    for i in 0..phases {
        manager
            .record_phase_completion(&format!("phase{i}"), 1.5, true, None)
            .unwrap();
    }
    manager.save().unwrap();
    manager
}

/// Locked atomic writes and reads at different history sizes.
fn bench_persistence(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_persistence");
    group.throughput(Throughput::Elements(1));

    for phases in [0, 10, 100] {
        let temp = TempDir::new().unwrap();
        let mut manager = manager_with_history(temp.path(), phases);

        group.bench_with_input(BenchmarkId::new("save", phases), &phases, |b, _| {
            b.iter(|| manager.save().unwrap());
        });

        group.bench_with_input(BenchmarkId::new("load", phases), &phases, |b, _| {
            b.iter(|| StateManager::load(black_box(ID), black_box(temp.path())).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("transact", phases), &phases, |b, _| {
            b.iter(|| {
                manager
                    .transact(|state| {
                        state.test_coverage = Some(0.5);
                        Ok(())
                    })
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_snapshots(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let manager = manager_with_history(temp.path(), 6);
    for _ in 0..20 {
        manager.create_snapshot(Some("bench")).unwrap();
    }

    c.bench_function("list_snapshots_20", |b| {
        b.iter(|| manager.list_snapshots().unwrap());
    });
}

fn bench_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("ids");

    group.bench_function("ports_for", |b| {
        b.iter(|| ports_for(black_box("deadbeef")).unwrap());
    });

    group.bench_function("generate_id", |b| {
        b.iter(generate_id);
    });

    group.finish();
}

fn bench_plan_parsing(c: &mut Criterion) {
    let plan = r#"```json
{
    "summary": "Add a CSV export endpoint",
    "approach": "Stream rows through a writer",
    "files_to_modify": ["src/api.rs", "src/routes.rs"],
    "files_to_create": ["src/export.rs"],
    "test_strategy": "Integration tests against a seeded database",
    "risks": ["Large exports exhaust memory"],
    "estimated_complexity": "medium"
}
```"#;

    c.bench_function("parse_plan_response", |b| {
        b.iter(|| parse_plan_response(black_box(plan)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_persistence,
    bench_snapshots,
    bench_ids,
    bench_plan_parsing,
);
criterion_main!(benches);
