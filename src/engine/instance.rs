//! Command instance lifecycle
//!
//! One instance per request. It collects body lines, then runs its unit of work under
//! the bounded retry driver and ends in `Done` or `Failed`:
//!
//! ```text
//! Collecting -> Ready -> Running -> Done | Failed
//! ```

use super::error::CommandError;
use super::retry::{run_bounded, RetryOutcome, RetryPolicy};
use crate::models::CommandSpec;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Collecting,
    Ready,
    Running,
    Done,
    Failed,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::Done | InstanceState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("command is not collecting body lines (state {0:?})")]
    NotCollecting(InstanceState),
    #[error("command is not ready to run (state {0:?})")]
    NotReady(InstanceState),
}

/// Terminal payload of an instance
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Success(Value),
    Failure(CommandError),
}

#[derive(Debug)]
pub struct CommandInstance {
    spec: CommandSpec,
    body: Vec<String>,
    state: InstanceState,
    attempts: u32,
    result: Option<CommandResult>,
}

impl CommandInstance {
    /// Start an instance for a parsed command line.
    ///
    /// A literal first line captured by the parser becomes body line 0. Commands that
    /// take no body are ready at once.
    pub fn new(spec: CommandSpec) -> Self {
        let state = if spec.kind.takes_body() {
            InstanceState::Collecting
        } else {
            InstanceState::Ready
        };
        let body = spec.first_line.iter().cloned().collect();

        Self {
            spec,
            body,
            state,
            attempts: 0,
            result: None,
        }
    }

    /// Start an instance whose body arrived in one piece (structured requests).
    pub fn with_body(spec: CommandSpec, text: &str) -> Self {
        let mut instance = Self::new(spec);
        instance.body.extend(text.lines().map(str::to_string));
        instance.state = InstanceState::Ready;
        instance
    }

    /// Feed one transport line.
    ///
    /// Returns `true` once the line ended collection. The terminating line is not
    /// part of the body.
    pub fn collect(&mut self, line: &str) -> Result<bool, InstanceError> {
        if self.state != InstanceState::Collecting {
            return Err(InstanceError::NotCollecting(self.state));
        }

        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if self.spec.is_terminator(line) {
            self.state = InstanceState::Ready;
            return Ok(true);
        }

        self.body.push(line.to_string());
        Ok(false)
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn result(&self) -> Option<&CommandResult> {
        self.result.as_ref()
    }

    pub fn body_lines(&self) -> &[String] {
        &self.body
    }

    /// Body lines joined with `\n`.
    pub fn body(&self) -> String {
        self.body.join("\n")
    }

    /// Execute the unit of work until a terminal state.
    ///
    /// Every ending of the work, including running out of attempts, is recorded as
    /// the instance result; only calling this outside `Ready` is an error.
    pub async fn run<W, Fut>(&mut self, policy: &RetryPolicy, work: W) -> Result<(), InstanceError>
    where
        W: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Value, CommandError>>,
    {
        if self.state != InstanceState::Ready {
            return Err(InstanceError::NotReady(self.state));
        }
        self.state = InstanceState::Running;

        let outcome = run_bounded(policy, CommandError::disposition, work).await;
        self.attempts = outcome.attempts();

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                log::info!("{} completed after {} attempt(s)", self.spec.kind, attempts);
                self.state = InstanceState::Done;
                self.result = Some(CommandResult::Success(value));
            }
            RetryOutcome::Failure { error, attempts } => {
                log::warn!(
                    "{} failed after {} attempt(s): {}",
                    self.spec.kind,
                    attempts,
                    error
                );
                self.state = InstanceState::Failed;
                self.result = Some(CommandResult::Failure(error));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parser::parse_command_line;
    use crate::engine::retry::MAX_ATTEMPTS;
    use serde_json::json;

    fn instance(line: &str) -> CommandInstance {
        CommandInstance::new(parse_command_line(line).unwrap())
    }

    #[test]
    fn test_terminator_capture() {
        let mut inst = instance("ASK");
        assert_eq!(inst.state(), InstanceState::Collecting);

        assert!(!inst.collect("line1").unwrap());
        assert!(!inst.collect("line2\r\n").unwrap());
        assert!(inst.collect("END").unwrap());

        assert_eq!(inst.state(), InstanceState::Ready);
        assert_eq!(inst.body_lines(), ["line1", "line2"]);
    }

    #[test]
    fn test_blank_line_capture() {
        let mut inst = instance("GENERATE -b");
        inst.collect("a").unwrap();
        assert!(inst.collect("").unwrap());
        assert_eq!(inst.body(), "a");
    }

    #[test]
    fn test_empty_line_is_body_without_flag() {
        let mut inst = instance("CODE STOP");
        inst.collect("first").unwrap();
        inst.collect("").unwrap();
        inst.collect("second").unwrap();
        assert!(inst.collect("STOP").unwrap());
        assert_eq!(inst.body(), "first\n\nsecond");
    }

    #[test]
    fn test_first_line_is_body_line_zero() {
        let mut inst = instance("DOC DONE /** existing */");
        inst.collect("int f();").unwrap();
        inst.collect("DONE").unwrap();
        assert_eq!(inst.body_lines(), ["/** existing */", "int f();"]);
    }

    #[test]
    fn test_collect_after_ready_fails() {
        let mut inst = instance("ASK");
        inst.collect("END").unwrap();
        assert_eq!(
            inst.collect("late"),
            Err(InstanceError::NotCollecting(InstanceState::Ready))
        );
    }

    #[test]
    fn test_bodyless_command_starts_ready() {
        let inst = instance("MODELS");
        assert_eq!(inst.state(), InstanceState::Ready);
    }

    #[test]
    fn test_with_body_is_ready() {
        let spec = parse_command_line("ASK").unwrap();
        let inst = CommandInstance::with_body(spec, "one\ntwo");
        assert_eq!(inst.state(), InstanceState::Ready);
        assert_eq!(inst.body(), "one\ntwo");
    }

    #[tokio::test]
    async fn test_timeouts_then_success_is_done() {
        let mut inst = instance("MODELS");
        inst.run(&RetryPolicy::immediate(), |attempt| async move {
            if attempt < 4 {
                Err(CommandError::Timeout("slow".into()))
            } else {
                Ok(json!("done"))
            }
        })
        .await
        .unwrap();

        assert_eq!(inst.state(), InstanceState::Done);
        assert_eq!(inst.attempts(), 4);
        assert_eq!(inst.result(), Some(&CommandResult::Success(json!("done"))));
    }

    #[tokio::test]
    async fn test_backend_error_fails_after_one_attempt() {
        let mut inst = instance("MODELS");
        inst.run(&RetryPolicy::immediate(), |_| async {
            Err(CommandError::Backend("bad request".into()))
        })
        .await
        .unwrap();

        assert_eq!(inst.state(), InstanceState::Failed);
        assert_eq!(inst.attempts(), 1);
        assert!(matches!(
            inst.result(),
            Some(CommandResult::Failure(CommandError::Backend(_)))
        ));
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let mut inst = instance("MODELS");
        inst.run(&RetryPolicy::immediate(), |_| async {
            Err(CommandError::Interrupted("cancelled".into()))
        })
        .await
        .unwrap();

        assert_eq!(inst.state(), InstanceState::Failed);
        assert_eq!(inst.attempts(), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_run_twice_rejected() {
        let mut inst = instance("MODELS");
        inst.run(&RetryPolicy::immediate(), |_| async { Ok(json!(1)) })
            .await
            .unwrap();

        let again = inst
            .run(&RetryPolicy::immediate(), |_| async { Ok(json!(2)) })
            .await;
        assert_eq!(again, Err(InstanceError::NotReady(InstanceState::Done)));
    }

    #[tokio::test]
    async fn test_run_while_collecting_rejected() {
        let mut inst = instance("ASK");
        let result = inst
            .run(&RetryPolicy::immediate(), |_| async { Ok(json!(null)) })
            .await;
        assert_eq!(result, Err(InstanceError::NotReady(InstanceState::Collecting)));
    }
}
