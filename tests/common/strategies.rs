#![allow(dead_code)]

use proptest::prelude::*;

use pipeline_graph::models::{InMemoryRun, RunBuilder, RunResult, StageSkip};

/// One action inside a stage or branch body
#[derive(Debug, Clone)]
pub enum BodyOp {
    Step(i64),
    /// Input answered after the given delay
    Input(i64),
    Warning,
}

/// One top-level action of a scripted pipeline
#[derive(Debug, Clone)]
pub enum ScriptOp {
    Step(i64),
    Stage { name: String, body: Vec<BodyOp> },
    Skipped(String),
    Parallel(Vec<(String, Vec<BodyOp>)>),
    /// A stage whose body forks after its own steps
    StageWithParallel {
        name: String,
        body: Vec<BodyOp>,
        branches: Vec<(String, Vec<BodyOp>)>,
    },
}

/// Work still running when a live run is snapshotted
#[derive(Debug, Clone)]
pub enum OpenTail {
    Stage { name: String, body: Vec<BodyOp> },
    /// A stage around a fork whose first `running` branches have not finished
    Fork {
        name: String,
        branches: Vec<(String, Vec<BodyOp>)>,
        running: usize,
    },
}

#[derive(Debug, Clone)]
pub struct PipelineScript {
    pub ops: Vec<ScriptOp>,
    pub finished: bool,
    /// Recorded only for live runs
    pub tail: Option<OpenTail>,
}

impl PipelineScript {
    pub fn record(&self) -> RunBuilder {
        let mut builder = RunBuilder::new("prop#1", 1_000);
        for op in &self.ops {
            match op {
                ScriptOp::Step(millis) => {
                    builder.step("sh", *millis);
                }
                ScriptOp::Stage { name, body } => {
                    builder.stage(name, |b| play(b, body));
                }
                ScriptOp::Skipped(name) => {
                    builder.skipped_stage(name, StageSkip::Conditional);
                }
                ScriptOp::Parallel(branches) => {
                    fork(&mut builder, branches);
                }
                ScriptOp::StageWithParallel {
                    name,
                    body,
                    branches,
                } => {
                    builder.stage(name, |b| {
                        play(b, body);
                        fork(b, branches);
                    });
                }
            }
        }
        if !self.finished {
            match &self.tail {
                Some(OpenTail::Stage { name, body }) => {
                    builder.open_stage(name);
                    play(&mut builder, body);
                }
                Some(OpenTail::Fork {
                    name,
                    branches,
                    running,
                }) => {
                    let names = branch_names(branches);
                    let running = &names[..(*running).min(names.len())];
                    builder.open_stage(name);
                    builder.live_parallel(&names, running, |branch, b| {
                        play(b, branch_body(branches, branch));
                    });
                }
                None => {}
            }
        }
        builder
    }

    /// The recorded run and a "now" that is not before any recorded timestamp
    pub fn run(&self) -> (InMemoryRun, i64) {
        let builder = self.record();
        let now = builder.now() + 5_000;
        if self.finished {
            (builder.finish(RunResult::Success), now)
        } else {
            (builder.build_running(), now)
        }
    }
}

fn branch_names(branches: &[(String, Vec<BodyOp>)]) -> Vec<&str> {
    branches.iter().map(|(n, _)| n.as_str()).collect()
}

fn branch_body<'a>(branches: &'a [(String, Vec<BodyOp>)], branch: &str) -> &'a [BodyOp] {
    branches
        .iter()
        .find(|(n, _)| n == branch)
        .map(|(_, body)| body.as_slice())
        .unwrap_or(&[])
}

fn fork(builder: &mut RunBuilder, branches: &[(String, Vec<BodyOp>)]) {
    builder.parallel(&branch_names(branches), |branch, b| {
        play(b, branch_body(branches, branch));
    });
}

fn play(builder: &mut RunBuilder, body: &[BodyOp]) {
    for op in body {
        match op {
            BodyOp::Step(millis) => {
                builder.step("sh", *millis);
            }
            BodyOp::Input(waited) => {
                builder.input(Some(*waited));
            }
            BodyOp::Warning => {
                builder.warning_step(RunResult::Unstable, "flaky");
            }
        }
    }
}

pub fn stage_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{1,8}"
}

pub fn body_strategy() -> impl Strategy<Value = Vec<BodyOp>> {
    prop::collection::vec(
        prop_oneof![
            4 => (1i64..5_000).prop_map(BodyOp::Step),
            1 => (1i64..10_000).prop_map(BodyOp::Input),
            1 => Just(BodyOp::Warning),
        ],
        0..4,
    )
}

/// Branch names are distinct so branch bodies can be looked up by name
pub fn branches_strategy() -> impl Strategy<Value = Vec<(String, Vec<BodyOp>)>> {
    prop::collection::vec(body_strategy(), 1..4).prop_map(|bodies| {
        bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| (format!("branch-{i}"), body))
            .collect()
    })
}

pub fn script_op_strategy() -> impl Strategy<Value = ScriptOp> {
    prop_oneof![
        1 => (1i64..2_000).prop_map(ScriptOp::Step),
        4 => (stage_name_strategy(), body_strategy())
            .prop_map(|(name, body)| ScriptOp::Stage { name, body }),
        1 => stage_name_strategy().prop_map(ScriptOp::Skipped),
        2 => branches_strategy().prop_map(ScriptOp::Parallel),
        2 => (stage_name_strategy(), body_strategy(), branches_strategy())
            .prop_map(|(name, body, branches)| ScriptOp::StageWithParallel { name, body, branches }),
    ]
}

pub fn open_tail_strategy() -> impl Strategy<Value = OpenTail> {
    prop_oneof![
        (stage_name_strategy(), body_strategy())
            .prop_map(|(name, body)| OpenTail::Stage { name, body }),
        (stage_name_strategy(), branches_strategy(), 0usize..4)
            .prop_map(|(name, branches, running)| OpenTail::Fork { name, branches, running }),
    ]
}

pub fn pipeline_script_strategy() -> impl Strategy<Value = PipelineScript> {
    (
        prop::collection::vec(script_op_strategy(), 1..8),
        any::<bool>(),
        prop::option::of(open_tail_strategy()),
    )
        .prop_map(|(ops, finished, tail)| PipelineScript { ops, finished, tail })
}
