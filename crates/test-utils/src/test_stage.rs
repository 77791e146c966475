use std::path::PathBuf;

use snpflow::errors::Result;
use snpflow::pipeline::{Stage, StageCatalog, StageContext};
use snpflow::sched::Task;

/// A stage whose tasks run `run <id> <n>` and that declares whatever inputs
/// and outputs the test gives it.
#[derive(Debug, Clone)]
pub struct TestStage {
    pub id: &'static str,
    pub tasks: usize,
    pub tools: &'static [&'static str],
    pub upstream: &'static [&'static str],
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl TestStage {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            tasks: 1,
            tools: &[],
            upstream: &[],
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn tasks(mut self, n: usize) -> Self {
        self.tasks = n;
        self
    }

    pub fn tools(mut self, tools: &'static [&'static str]) -> Self {
        self.tools = tools;
        self
    }

    pub fn upstream(mut self, upstream: &'static [&'static str]) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }
}

impl Stage for TestStage {
    fn id(&self) -> &'static str {
        self.id
    }

    fn description(&self) -> &'static str {
        "test stage"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        self.tools
    }

    fn upstream(&self) -> &'static [&'static str] {
        self.upstream
    }

    fn input_files(&self, _ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(self.inputs.clone())
    }

    fn output_files(&self, _ctx: &StageContext<'_>) -> Result<Vec<PathBuf>> {
        Ok(self.outputs.clone())
    }

    fn build_tasks(&self, ctx: &StageContext<'_>) -> Result<Vec<Task>> {
        Ok((1..=self.tasks)
            .map(|n| ctx.task(self.id, format!("{}:{n}", self.id), format!("run {} {n}", self.id)))
            .collect())
    }
}

/// A catalog of single-task stages in the given order.
pub fn linear_catalog(ids: &[&'static str]) -> StageCatalog {
    let stages: Vec<Box<dyn Stage>> = ids
        .iter()
        .map(|&id| Box::new(TestStage::new(id)) as Box<dyn Stage>)
        .collect();
    StageCatalog::new(stages).expect("linear catalog is valid")
}
