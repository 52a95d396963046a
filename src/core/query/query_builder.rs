// SPDX-License-Identifier: MIT OR Apache-2.0

//! Programmatic query wiring
//!
//! ```ignore
//! app.define_query("HighPrice")
//!     .from_stream("StockStream")
//!     .filter(|e| e.get_f64("price") > Some(100.0))
//!     .window("timeBatch", window_properties([("duration", 1000_i64)]))
//!     .select(["symbol", "price"])
//!     .insert_into("HighPriceStream")?;
//! ```
//!
//! Nothing is wired until the terminal call; a query that fails validation
//! leaves the application untouched.

use crate::core::error::{WisdomError, WisdomResult};
use crate::core::event::Event;
use crate::core::query::input::stream::state::{Pattern, PatternProcessor};
use crate::core::query::processor::filter_processor::EventPredicate;
use crate::core::query::processor::stream::window::{WindowProcessor, WindowProperties};
use crate::core::query::processor::{FilterProcessor, Processor, SelectProcessor};
use crate::core::stream::Stream;
use crate::core::wisdom_app::WisdomApp;
use std::sync::Arc;

enum QueryInput {
    Stream(String),
    Pattern(Box<Pattern>),
}

enum Stage {
    Filter(EventPredicate),
    Window {
        namespace: String,
        properties: WindowProperties,
    },
    Select(Vec<(String, String)>),
}

pub struct QueryBuilder<'a> {
    app: &'a WisdomApp,
    id: String,
    input: Option<QueryInput>,
    stages: Vec<Stage>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(app: &'a WisdomApp, id: impl Into<String>) -> Self {
        Self {
            app,
            id: id.into(),
            input: None,
            stages: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn from_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.input = Some(QueryInput::Stream(stream_id.into()));
        self
    }

    /// Feed the query with the matches of `pattern`
    pub fn from_pattern(mut self, pattern: Pattern) -> Self {
        self.input = Some(QueryInput::Pattern(Box::new(pattern)));
        self
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.stages.push(Stage::Filter(Arc::new(predicate)));
        self
    }

    /// Batch events through the window registered under `namespace`
    pub fn window(mut self, namespace: impl Into<String>, properties: WindowProperties) -> Self {
        self.stages.push(Stage::Window {
            namespace: namespace.into(),
            properties,
        });
        self
    }

    /// Keep only the listed attributes
    pub fn select<I, S>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_as(attributes.into_iter().map(|a| {
            let name: String = a.into();
            (name.clone(), name)
        }))
    }

    /// Keep the listed `(attribute, output name)` pairs
    pub fn select_as<I, S, T>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(source, alias)| (source.into(), alias.into()))
            .collect();
        self.stages.push(Stage::Select(attributes));
        self
    }

    /// Publish the query output into `stream_id`
    pub fn insert_into(self, stream_id: &str) -> WisdomResult<()> {
        let target: Arc<dyn Processor> = self.app.get_stream(stream_id)?;
        self.to_processor(target)
    }

    /// Hand the query output to `next`
    pub fn to_processor(self, next: Arc<dyn Processor>) -> WisdomResult<()> {
        let Self {
            app,
            id,
            input,
            stages,
        } = self;
        let input = input.ok_or_else(|| {
            WisdomError::validation_with_field(format!("Query '{id}' has no input"), "input")
        })?;

        let inputs: Vec<Arc<Stream>> = match &input {
            QueryInput::Stream(stream_id) => vec![app.get_stream(stream_id)?],
            QueryInput::Pattern(pattern) => {
                pattern.validate()?;
                pattern
                    .streams()
                    .iter()
                    .map(|s| app.get_stream(s))
                    .collect::<WisdomResult<_>>()?
            }
        };

        let mut stateful: Vec<Arc<dyn Processor>> = Vec::new();
        let mut head = next;
        for stage in stages.into_iter().rev() {
            head = match stage {
                Stage::Filter(predicate) => Arc::new(FilterProcessor::new(predicate, head)),
                Stage::Select(attributes) => Arc::new(SelectProcessor::new(attributes, head)),
                Stage::Window {
                    namespace,
                    properties,
                } => {
                    let window = app
                        .context()
                        .extensions()
                        .create_window(&namespace, &properties)?;
                    let processor: Arc<dyn Processor> =
                        Arc::new(WindowProcessor::new(namespace, window, head));
                    stateful.push(Arc::clone(&processor));
                    processor
                }
            };
        }

        if let QueryInput::Pattern(pattern) = &input {
            let processor: Arc<dyn Processor> = Arc::new(PatternProcessor::new(pattern, head)?);
            stateful.push(Arc::clone(&processor));
            head = processor;
        }

        for stream in &inputs {
            stream.add_processor(Arc::clone(&head));
        }
        log::info!(
            "[{}] Query '{}' wired on {:?}",
            app.name(),
            id,
            inputs.iter().map(|s| s.id()).collect::<Vec<_>>()
        );
        app.register_processors(stateful)
    }
}
