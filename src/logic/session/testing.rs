//! Scripted link transcripts for session-layer tests.

use std::collections::VecDeque;

use super::link::{LinkError, ObdLink};

/// Replays a fixed command/reply transcript, asserting command order.
pub struct ScriptedLink {
    steps: VecDeque<(String, Result<String, LinkError>)>,
    endpoint: String,
}

impl ScriptedLink {
    pub fn new(steps: Vec<(&str, &str)>) -> Self {
        Self::with_results(
            steps
                .into_iter()
                .map(|(cmd, reply)| (cmd, Ok(reply.to_string())))
                .collect(),
        )
    }

    pub fn with_results(steps: Vec<(&str, Result<String, LinkError>)>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|(cmd, reply)| (cmd.to_string(), reply))
                .collect(),
            endpoint: "tcp://scripted:0".to_string(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl ObdLink for ScriptedLink {
    fn exchange(&mut self, command: &str) -> Result<String, LinkError> {
        let (expected, reply) = self
            .steps
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command {:?} after script end", command));
        assert_eq!(command, expected, "command out of script order");
        reply
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
