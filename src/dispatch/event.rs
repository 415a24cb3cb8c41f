//! Pending events handed to the tracker by event producers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::buffer::BufferWriter;
use crate::domain::{ParamInput, ParamOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdAction {
    Impression,
    Touch,
}

/// Closed set of categories the dispatcher groups on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Ad(AdAction),
    /// Custom object or other annotation riding along the next hit.
    Annotation,
    /// Screen-level context (custom variables, aisles, locations).
    ScreenContext,
    /// Screen view; `basket` marks a cart screen.
    Screen { basket: bool },
    Cart,
    Order,
    InternalSearch,
    Product,
    /// Click; `search` marks a click on a search result.
    Gesture { search: bool },
    /// Anything else is one event per hit.
    Other,
}

/// An occurrence waiting to be serialized.
pub trait PendingEvent: Send + Sync {
    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
    fn category(&self) -> EventCategory;
    /// Writes the event's parameters into the buffer being built.
    fn populate(&self, writer: &mut BufferWriter<'_>);
}

/// Event described as a list of parameters.
#[derive(Clone)]
pub struct BasicEvent {
    id: Uuid,
    created_at: DateTime<Utc>,
    category: EventCategory,
    params: Vec<(String, ParamInput, ParamOption)>,
}

impl fmt::Debug for BasicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicEvent")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("category", &self.category)
            .field("params", &self.params.len())
            .finish()
    }
}

impl BasicEvent {
    pub fn new(category: EventCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            category,
            params: Vec::new(),
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn param(self, key: &str, value: impl Into<ParamInput>) -> Self {
        self.param_with(key, value, ParamOption::default())
    }

    pub fn param_with(mut self, key: &str, value: impl Into<ParamInput>, options: ParamOption) -> Self {
        self.params.push((key.to_string(), value.into(), options));
        self
    }

    pub fn screen(name: &str) -> Self {
        Self::new(EventCategory::Screen { basket: false })
            .param("type", "screen")
            .param("action", "view")
            .param("p", name)
    }

    pub fn basket_screen(name: &str) -> Self {
        Self {
            category: EventCategory::Screen { basket: true },
            ..Self::screen(name)
        }
    }

    pub fn product(product_id: &str) -> Self {
        Self::new(EventCategory::Product)
            .param("type", "pdt")
            .param_with("pdtl", product_id, ParamOption::default().append().separator('|'))
    }

    pub fn ad_impression(ad_id: &str) -> Self {
        Self::new(EventCategory::Ad(AdAction::Impression))
            .param("type", "AT")
            .param_with("ati", ad_id, ParamOption::default().append())
    }

    pub fn ad_touch(ad_id: &str) -> Self {
        Self::new(EventCategory::Ad(AdAction::Touch))
            .param("type", "AT")
            .param("atc", ad_id)
    }

    /// Custom JSON object merged into the `stc` parameter.
    pub fn custom(value: Value) -> Self {
        Self::new(EventCategory::Annotation).param_with("stc", value, ParamOption::default().append().encode())
    }

    pub fn gesture(name: &str) -> Self {
        Self::new(EventCategory::Gesture { search: false })
            .param("type", "click")
            .param("action", "A")
            .param("p", name)
    }

    pub fn search_gesture(name: &str) -> Self {
        Self {
            category: EventCategory::Gesture { search: true },
            ..Self::gesture(name)
        }
    }

    pub fn internal_search(keyword: &str, page: u32) -> Self {
        Self::new(EventCategory::InternalSearch)
            .param_with("mc", keyword, ParamOption::default().encode())
            .param("np", page)
    }

    pub fn cart(cart_id: &str) -> Self {
        Self::new(EventCategory::Cart).param("idcart", cart_id)
    }

    pub fn order(order_id: &str, turnover: f64) -> Self {
        Self::new(EventCategory::Order)
            .param("cmd", order_id)
            .param("roimt", turnover)
    }
}

impl PendingEvent for BasicEvent {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn category(&self) -> EventCategory {
        self.category
    }

    fn populate(&self, writer: &mut BufferWriter<'_>) {
        for (key, value, options) in &self.params {
            writer.set_with(key, value.clone(), *options);
        }
    }
}
