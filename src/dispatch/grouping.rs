//! Decides how pending events are grouped into hits.

use super::event::{AdAction, EventCategory};

#[derive(Default)]
struct Buckets {
    ads: Vec<usize>,
    custom: Vec<usize>,
    screens: Vec<usize>,
    search: Vec<usize>,
    products: Vec<usize>,
    carts: Vec<usize>,
    orders: Vec<usize>,
    groups: Vec<Vec<usize>>,
}

impl Buckets {
    fn emit(&mut self, group: Vec<usize>) {
        if !group.is_empty() {
            self.groups.push(group);
        }
    }

    fn flush_products(&mut self) {
        let mut group = std::mem::take(&mut self.products);
        group.append(&mut self.custom);
        self.emit(group);
    }

    fn flush_ads(&mut self) {
        let mut group = std::mem::take(&mut self.ads);
        group.append(&mut self.custom);
        self.emit(group);
    }
}

/// Groups events (indices into `categories`, already sorted by creation
/// date) into hits, in emission order.
///
/// Screens close a hit carrying the buffered ads, annotations, screen
/// context and search, plus the sales context when the screen is a cart
/// screen or an order is pending. Products never share a hit with anything
/// but annotations. Events that end up in no group (a cart never followed by
/// a cart screen or order) stay pending.
pub fn plan_flushes(categories: &[EventCategory]) -> Vec<Vec<usize>> {
    let mut b = Buckets::default();

    for (i, category) in categories.iter().copied().enumerate() {
        if category != EventCategory::Product && !b.products.is_empty() {
            b.flush_products();
        }

        let keeps_ads = matches!(
            category,
            EventCategory::Ad(AdAction::Impression)
                | EventCategory::ScreenContext
                | EventCategory::Screen { .. }
                | EventCategory::InternalSearch
                | EventCategory::Cart
                | EventCategory::Order
        );
        if !keeps_ads && !b.ads.is_empty() {
            b.flush_ads();
        }

        match category {
            EventCategory::Ad(AdAction::Impression) => b.ads.push(i),
            EventCategory::Ad(AdAction::Touch) => {
                let mut group = std::mem::take(&mut b.custom);
                group.push(i);
                b.emit(group);
            }
            EventCategory::Product => b.products.push(i),
            EventCategory::Annotation => b.custom.push(i),
            EventCategory::Cart => b.carts.push(i),
            EventCategory::Order => b.orders.push(i),
            EventCategory::ScreenContext => b.screens.push(i),
            EventCategory::InternalSearch => b.search.push(i),
            EventCategory::Screen { basket } => {
                let mut group = std::mem::take(&mut b.ads);
                group.append(&mut b.custom);
                group.append(&mut b.screens);
                group.append(&mut b.search);
                if basket || !b.orders.is_empty() {
                    if let Some(cart) = b.carts.pop() {
                        group.push(cart);
                    }
                    b.carts.clear();
                    group.append(&mut b.orders);
                }
                group.push(i);
                b.emit(group);
            }
            EventCategory::Gesture { search } => {
                let mut group = std::mem::take(&mut b.ads);
                if search {
                    group.append(&mut b.search);
                }
                group.append(&mut b.custom);
                group.push(i);
                b.emit(group);
            }
            EventCategory::Other => {
                let mut group = std::mem::take(&mut b.ads);
                group.append(&mut b.custom);
                group.push(i);
                b.emit(group);
            }
        }
    }

    if !b.ads.is_empty() {
        b.flush_ads();
    }
    if !b.products.is_empty() {
        b.flush_products();
    }
    let mut residual = std::mem::take(&mut b.custom);
    residual.append(&mut b.search);
    residual.append(&mut b.screens);
    b.emit(residual);

    b.groups
}
