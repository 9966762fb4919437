use futures::TryStreamExt;
use trellis_core::event::Event;
use trellis_core::Result;

pub use trellis_core::traits::Backend;

/// Drain `stream` into a vector, stopping at the first error.
pub async fn collect_stream<B: Backend>(
    backend: &B,
    compiled: &B::Compiled,
    input: &str,
) -> Result<Vec<Event>> {
    backend.stream(compiled, input).try_collect().await
}

/// Text of the last final event that carries any.
pub fn final_response(events: &[Event]) -> Option<&str> {
    events
        .iter()
        .rev()
        .filter(|e| e.is_final() && !e.is_failure())
        .find_map(|e| e.content.as_deref())
}

/// Merge every state delta in order; later writes win.
pub fn merged_state(events: &[Event]) -> trellis_core::StateMap {
    let mut state = trellis_core::StateMap::new();
    for event in events {
        for (key, value) in &event.actions.state_delta {
            if value.is_null() {
                state.remove(key);
            } else {
                state.insert(key.clone(), value.clone());
            }
        }
    }
    state
}
