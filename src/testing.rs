use crate::poller::Sleeper;
use crate::process::{CommandOutput, ProcessRequest, ProcessRunner};
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

struct Rule {
    pattern: String,
    queue: VecDeque<CommandOutput>,
}

#[derive(Default)]
pub struct MockRunner {
    calls: RefCell<Vec<ProcessRequest>>,
    rules: RefCell<Vec<Rule>>,
    spawn_failures: RefCell<Vec<String>>,
    available: RefCell<Option<BTreeSet<String>>>,
}

impl MockRunner {
    // Every command whose rendered form contains `pattern` gets `output`.
    // Later rules win over earlier ones.
    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        self.respond_seq(pattern, vec![output]);
    }

    pub fn respond_seq(&self, pattern: &str, outputs: Vec<CommandOutput>) {
        self.rules.borrow_mut().push(Rule {
            pattern: pattern.to_string(),
            queue: outputs.into(),
        });
    }

    pub fn fail_spawn(&self, program: &str) {
        self.spawn_failures.borrow_mut().push(program.to_string());
    }

    pub fn set_available(&self, programs: &[&str]) {
        *self.available.borrow_mut() = Some(programs.iter().map(|p| p.to_string()).collect());
    }

    pub fn calls(&self) -> Vec<ProcessRequest> {
        self.calls.borrow().clone()
    }

    pub fn rendered(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ProcessRequest::render).collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.rendered()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.rendered().iter().position(|line| line.contains(pattern))
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, request: &ProcessRequest) -> Result<CommandOutput, io::Error> {
        self.calls.borrow_mut().push(request.clone());
        if self
            .spawn_failures
            .borrow()
            .iter()
            .any(|program| program == &request.program)
        {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not found"));
        }
        let rendered = request.render();
        let mut rules = self.rules.borrow_mut();
        for rule in rules.iter_mut().rev() {
            if !rendered.contains(&rule.pattern) {
                continue;
            }
            if rule.queue.len() > 1 {
                if let Some(output) = rule.queue.pop_front() {
                    return Ok(output);
                }
            }
            if let Some(output) = rule.queue.front() {
                return Ok(output.clone());
            }
        }
        Ok(CommandOutput::ok())
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        match &*self.available.borrow() {
            Some(set) if !set.contains(program) => None,
            _ => Some(PathBuf::from("/usr/bin").join(program)),
        }
    }
}

#[derive(Default)]
pub struct FakeSleeper {
    pub slept: RefCell<Vec<Duration>>,
}

impl Sleeper for FakeSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}
