//! Per-session countdown clock.
//!
//! A session has at most one interval task. Starting a clock always cancels
//! the previous one first; every task carries a generation number and ticks
//! whose generation is no longer attached to the session are dropped.

use std::time::Duration;

use actix::prelude::*;
use log::debug;

use super::session::{SessionRegistry, TickOutcome};
use crate::models::{Color, GameSession};

pub const TICK: Duration = Duration::from_secs(1);

/// Something that can cancel a scheduled clock task.
pub trait ClockCanceller {
    fn cancel(&mut self, handle: SpawnHandle);
}

impl<A> ClockCanceller for Context<A>
where
    A: Actor<Context = Context<A>>,
{
    fn cancel(&mut self, handle: SpawnHandle) {
        self.cancel_future(handle);
    }
}

/// An actor that owns a [`SessionRegistry`] and runs its clocks.
pub trait ClockHost: Actor<Context = Context<Self>> {
    fn sessions(&mut self) -> &mut SessionRegistry;
}

/// Start (or restart) the clock of the side to move.
///
/// `on_tick` fires once right away and then after every decrement.
/// `on_expire` fires once when the running seat reaches zero; by then the
/// session is already in `timeout` state.
pub fn start_clock<A, T, E>(act: &mut A, ctx: &mut Context<A>, key: &str, mut on_tick: T, on_expire: E)
where
    A: ClockHost,
    T: FnMut(&mut A, &mut Context<A>, &GameSession) + 'static,
    E: FnOnce(&mut A, &mut Context<A>, Color, GameSession) + 'static,
{
    act.sessions().stop_clock(key, ctx);
    let Some((session_id, generation, snapshot)) = act.sessions().prepare_clock(key) else {
        return;
    };

    on_tick(act, ctx, &snapshot);

    let tick_session = session_id.clone();
    let mut on_expire = Some(on_expire);
    let handle = ctx.run_interval(TICK, move |act, ctx| {
        match act.sessions().tick(&tick_session, generation, ctx) {
            TickOutcome::Running(session) => on_tick(act, ctx, &session),
            TickOutcome::Expired { color, session } => {
                on_tick(act, ctx, &session);
                if let Some(expire) = on_expire.take() {
                    expire(act, ctx, color, session);
                }
            }
            TickOutcome::Stale => debug!("Dropping stale clock tick for {}", tick_session),
        }
    });
    act.sessions().attach_clock(&session_id, generation, handle);
}
