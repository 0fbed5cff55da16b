//! Scripted stand-ins for the judge and the trainable model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::judge::{Judge, JudgeRequest};
use crate::model::{ChatMessage, Choice, CompletionModel};

/// A judge that answers from a closure and records every request.
pub struct ScriptedJudge {
    responder: Box<dyn Fn(&str) -> String + Send + Sync>,
    calls: Mutex<Vec<JudgeRequest>>,
}

impl ScriptedJudge {
    pub fn new(responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn constant(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_| answer.clone())
    }

    pub fn calls(&self) -> Vec<JudgeRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Judge for ScriptedJudge {
    async fn judge(&self, request: JudgeRequest) -> String {
        let answer = (self.responder)(&request.prompt);
        self.calls.lock().unwrap().push(request);
        answer
    }
}

enum Step {
    Truncated,
    Fail(String),
}

/// A model that replies with fixed content, after playing any queued
/// truncations or failures.
pub struct ScriptedModel {
    name: String,
    reply: String,
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    budgets: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            name: "scripted".into(),
            reply: reply.into(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            budgets: Mutex::new(Vec::new()),
        }
    }

    pub fn then_truncated(self) -> Self {
        self.script.lock().unwrap().push_back(Step::Truncated);
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Step::Fail(message.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The output budget of every call, in order.
    pub fn budgets(&self) -> Vec<usize> {
        self.budgets.lock().unwrap().clone()
    }
}

impl CompletionModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _messages: &[ChatMessage], max_output_tokens: usize) -> Result<Choice> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.budgets.lock().unwrap().push(max_output_tokens);

        let step = self.script.lock().unwrap().pop_front();
        let (content, finish_reason) = match step {
            Some(Step::Fail(message)) => return Err(anyhow!(message)),
            Some(Step::Truncated) => (self.reply.clone(), "length"),
            None => (self.reply.clone(), "stop"),
        };
        Ok(Choice {
            index: 0,
            message: ChatMessage::assistant(content),
            finish_reason: Some(finish_reason.into()),
        })
    }
}
