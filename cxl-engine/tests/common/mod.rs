// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_engine::engine::Engine;
use cxl_engine::events::once::Once;

// Create an event and spawn a task that will trigger it after the specified
// number of ticks of the default clock.
pub fn create_once_event_at_delay<T>(engine: &Engine, delay: u64, value: T) -> Once<T>
where
    T: Copy + 'static,
{
    let event = Once::new(value);
    {
        let clock = engine.default_clock();
        let event = event.clone();
        engine.spawn(async move {
            clock.wait_ticks(delay).await;
            event.notify()?;
            Ok(())
        });
    }
    event
}
