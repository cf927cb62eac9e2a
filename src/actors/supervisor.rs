use actix::prelude::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::DrowsewatchError;
use crate::messages::supervisor::{RegisterActor, SystemShutdown};
use crate::messages::{ActorFailed, ActorHealth, GetSystemHealth, HealthCheck, SystemHealth};

/// SupervisorActor tracks the health of the other actors in the system and
/// owns the shutdown path.
pub struct SupervisorActor {
    start_time: Instant,
    actor_health: HashMap<String, ActorHealth>,
    shutdown_requested: bool,
}

impl Default for SupervisorActor {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            actor_health: HashMap::new(),
            shutdown_requested: false,
        }
    }
}

impl Actor for SupervisorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("SupervisorActor started");

        // Periodic health sweep, log-only.
        ctx.run_interval(Duration::from_secs(30), |actor, _ctx| {
            actor.perform_health_check();
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("SupervisorActor stopped. System will now terminate.");
    }
}

impl SupervisorActor {
    pub fn new() -> Self {
        Self::default()
    }

    fn perform_health_check(&self) {
        let unhealthy_actors: Vec<_> = self
            .actor_health
            .iter()
            .filter(|(_, health)| !health.healthy)
            .map(|(name, _)| name)
            .collect();

        if !unhealthy_actors.is_empty() {
            warn!("Unhealthy actors detected: {:?}", unhealthy_actors);
        }
    }

    fn is_system_healthy(&self) -> bool {
        !self.shutdown_requested && self.actor_health.values().all(|health| health.healthy)
    }
}

impl Handler<RegisterActor> for SupervisorActor {
    type Result = ();

    fn handle(&mut self, msg: RegisterActor, _ctx: &mut Self::Context) -> Self::Result {
        let health = ActorHealth {
            name: msg.name.clone(),
            healthy: true,
            error_count: 0,
            last_error: None,
        };
        self.actor_health.insert(msg.name.clone(), health);
        info!("Registered actor '{}' for monitoring", msg.name);
    }
}

impl Handler<ActorFailed> for SupervisorActor {
    type Result = ();

    fn handle(&mut self, msg: ActorFailed, _ctx: &mut Self::Context) -> Self::Result {
        error!("Actor '{}' failed: {}", msg.actor_name, msg.error);

        if let Some(health) = self.actor_health.get_mut(&msg.actor_name) {
            health.healthy = false;
            health.error_count += 1;
            health.last_error = Some(msg.error.clone());
        }

        warn!("Actor '{}' marked as unhealthy", msg.actor_name);
    }
}

impl Handler<HealthCheck> for SupervisorActor {
    type Result = ();

    fn handle(&mut self, msg: HealthCheck, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(health) = self.actor_health.get_mut(&msg.actor_name) {
            health.healthy = msg.healthy;
            if msg.healthy {
                health.last_error = None;
            }
        }
    }
}

impl Handler<GetSystemHealth> for SupervisorActor {
    type Result = Result<SystemHealth, DrowsewatchError>;

    fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Self::Context) -> Self::Result {
        Ok(SystemHealth {
            overall_healthy: self.is_system_healthy(),
            actor_statuses: self.actor_health.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }
}

impl Handler<SystemShutdown> for SupervisorActor {
    type Result = ();

    fn handle(&mut self, _msg: SystemShutdown, _ctx: &mut Self::Context) -> Self::Result {
        info!("System shutdown requested");
        self.shutdown_requested = true;
        System::current().stop();
    }
}
