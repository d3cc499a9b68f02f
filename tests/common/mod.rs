//! Scripted in-memory page for driving the watcher without a browser

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regen_watch::controller::{BackoffSchedule, IdlePolicy, RetryController};
use regen_watch::inspector::{ButtonStrategy, PageInspector, PageSurface};
use regen_watch::{PageProfile, WatchError};

/// What the fake page currently shows
#[derive(Debug, Default)]
pub struct PageScript {
    /// Error banner visible
    pub error: bool,
    /// Answers for the next error-banner queries, before falling back to `error`
    pub error_answers: VecDeque<bool>,
    pub generating: bool,
    pub messages: usize,
    /// Strategy labels that find a control on this page
    pub buttons: Vec<&'static str>,
    /// Every strategy tried, in order
    pub locate_calls: Vec<&'static str>,
    pub clicks: usize,
    /// Page reaction to a click
    pub on_click: Option<fn(&mut PageScript)>,
    /// Every query errors out, as a detached page would
    pub broken: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedPage {
    script: Arc<Mutex<PageScript>>,
    profile: PageProfile,
}

impl ScriptedPage {
    pub fn new(script: PageScript) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            profile: PageProfile::default(),
        }
    }

    /// Page showing the busy banner with every strategy able to find the control
    pub fn busy() -> Self {
        Self::new(PageScript {
            error: true,
            buttons: vec!["marker_ancestor", "container_with_marker", "markup_scan"],
            ..PageScript::default()
        })
    }

    pub fn update(&self, change: impl FnOnce(&mut PageScript)) {
        change(&mut self.script.lock().unwrap());
    }

    pub fn clicks(&self) -> usize {
        self.script.lock().unwrap().clicks
    }

    pub fn locate_calls(&self) -> Vec<&'static str> {
        self.script.lock().unwrap().locate_calls.clone()
    }

    /// Switch the page to a finished answer
    pub fn show_answer(&self) {
        self.update(|s| {
            s.error = false;
            s.error_answers.clear();
            s.generating = false;
            s.messages = 2;
        });
    }
}

fn broken() -> WatchError {
    WatchError::Cdp("target closed".to_string())
}

#[async_trait]
impl PageSurface for ScriptedPage {
    type Handle = String;

    async fn find_text(
        &self,
        selector: &str,
        needles: &[String],
    ) -> Result<Option<String>, WatchError> {
        let mut script = self.script.lock().unwrap();
        if script.broken {
            return Err(broken());
        }
        assert_eq!(selector, self.profile.error_text_selector);
        let showing = script.error_answers.pop_front().unwrap_or(script.error);
        Ok(showing.then(|| format!("{}，请稍后再试。", needles[0])))
    }

    async fn count(&self, selector: &str) -> Result<usize, WatchError> {
        let script = self.script.lock().unwrap();
        if script.broken {
            return Err(broken());
        }
        if selector == self.profile.loading_selector {
            Ok(usize::from(script.generating))
        } else if selector == self.profile.message_selector {
            Ok(script.messages)
        } else {
            Ok(0)
        }
    }

    async fn locate(&self, strategy: &ButtonStrategy) -> Result<Option<String>, WatchError> {
        let mut script = self.script.lock().unwrap();
        if script.broken {
            return Err(broken());
        }
        script.locate_calls.push(strategy.label());
        Ok(script
            .buttons
            .contains(&strategy.label())
            .then(|| strategy.label().to_string()))
    }

    async fn activate(&self, _handle: String) -> Result<(), WatchError> {
        let mut script = self.script.lock().unwrap();
        if script.broken {
            return Err(broken());
        }
        script.clicks += 1;
        if let Some(effect) = script.on_click {
            effect(&mut script);
        }
        Ok(())
    }
}

pub fn controller(page: &ScriptedPage, max_clicks: Option<u32>) -> RetryController<ScriptedPage> {
    controller_with(page, max_clicks, BackoffSchedule::default(), IdlePolicy::Reschedule)
}

pub fn controller_with(
    page: &ScriptedPage,
    max_clicks: Option<u32>,
    schedule: BackoffSchedule,
    idle_policy: IdlePolicy,
) -> RetryController<ScriptedPage> {
    let inspector = PageInspector::new(page.clone(), PageProfile::default());
    RetryController::new(inspector, schedule, max_clicks, idle_policy)
}
