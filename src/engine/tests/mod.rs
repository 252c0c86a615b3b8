
use crate::types::Reply;
use std::sync::{Arc, Mutex};

/// Collects every reply a callback receives
pub(super) type Replies = Arc<Mutex<Vec<Reply>>>;

pub(super) fn recorder() -> (Replies, impl FnOnce(Reply) + Send + 'static) {
    let replies: Replies = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&replies);
    (replies, move |reply| sink.lock().unwrap().push(reply))
}
