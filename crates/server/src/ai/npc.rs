use crate::config::NpcConfig;
use crate::server::client::ClientProxy;
use crate::world::Subscription;
use protocol::types::NpcInfo;
use protocol::{Hitpoints, ServerEvent, Vector};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Behavior state of an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcState {
    Idle,
    Walk,
    Attack,
    Returning,
}

/// A hostile NPC guarding its spawn point.
#[derive(Debug, Clone)]
pub struct Npc {
    pub uuid: Uuid,
    pub pos: Vector,
    pub spawn: Vector,
    pub hitpoints: Hitpoints,
    pub state: NpcState,
    /// Targeted client id. Resolved against the cell's subscribers every tick.
    pub target: Option<u32>,
    /// Ticks until the next walk step.
    pub move_cooldown: u32,
    /// Ticks until the next attack.
    pub attack_cooldown: u32,
    /// Set when killed; the cell drops the NPC on its next pass.
    pub remove: bool,
}

/// What an NPC needs from its cell for one update.
pub struct NpcContext<'a> {
    pub config: &'a NpcConfig,
    pub cell_key: &'a str,
    pub subscriptions: &'a HashMap<u32, Subscription>,
}

impl<'a> NpcContext<'a> {
    fn resolve(&self, id: u32) -> Option<&'a Arc<ClientProxy>> {
        self.subscriptions
            .get(&id)
            .map(|s| &s.client)
            .filter(|c| c.is_connected())
    }
}

impl Npc {
    pub fn new(spawn: Vector, hitpoints: i32) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            pos: spawn,
            spawn,
            hitpoints: Hitpoints::full(hitpoints),
            state: NpcState::Idle,
            target: None,
            move_cooldown: 0,
            attack_cooldown: 0,
            remove: false,
        }
    }

    pub fn info(&self) -> NpcInfo {
        NpcInfo {
            uuid: self.uuid,
            pos: self.pos,
            hitpoints: self.hitpoints,
            npc_type: String::new(),
        }
    }

    /// Advance the state machine by one tick, appending events to `events`.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        ctx: &NpcContext<'_>,
        events: &mut Vec<ServerEvent>,
        rng: &mut R,
    ) {
        let target = match self.target {
            Some(id) => match ctx.resolve(id) {
                Some(client) => Some(client),
                None => {
                    self.target = None;
                    if matches!(self.state, NpcState::Walk | NpcState::Attack) {
                        self.state = NpcState::Returning;
                        return;
                    }
                    None
                }
            },
            None => None,
        };

        match self.state {
            NpcState::Idle => self.idle(ctx, target),
            NpcState::Walk => match target {
                Some(client) => self.walk(ctx, client, events),
                None => self.state = NpcState::Returning,
            },
            NpcState::Attack => match target {
                Some(client) => self.attack(ctx, client, events, rng),
                None => self.state = NpcState::Returning,
            },
            NpcState::Returning => self.return_home(ctx, events),
        }
    }

    fn idle(&mut self, ctx: &NpcContext<'_>, target: Option<&Arc<ClientProxy>>) {
        let Some(client) = target else {
            // Acquiring a target takes the whole tick.
            self.target = ctx
                .subscriptions
                .values()
                .filter(|s| s.client.is_connected())
                .map(|s| (s.client.id, s.client.pos().distance(self.pos)))
                .filter(|&(_, dist)| dist < ctx.config.aggro_radius)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, _)| id);
            return;
        };

        self.state = if client.pos().distance(self.pos) < ctx.config.melee_range {
            NpcState::Attack
        } else {
            NpcState::Walk
        };
    }

    fn walk(&mut self, ctx: &NpcContext<'_>, client: &ClientProxy, events: &mut Vec<ServerEvent>) {
        if self.move_cooldown > 0 {
            self.move_cooldown -= 1;
            return;
        }

        let target_pos = client.pos();
        self.pos = self.pos.step_towards(target_pos, ctx.config.step_size);
        events.push(self.position_event(ctx));

        if self.spawn.distance(self.pos) > ctx.config.leash_radius {
            self.state = NpcState::Returning;
            self.target = None;
            self.hitpoints.restore();
            events.push(self.healed_event(ctx));
        } else if target_pos.distance(self.pos) < ctx.config.melee_range {
            self.state = NpcState::Attack;
        } else {
            self.state = NpcState::Idle;
            self.move_cooldown = ctx.config.move_cooldown;
        }
    }

    fn attack<R: Rng + ?Sized>(
        &mut self,
        ctx: &NpcContext<'_>,
        client: &ClientProxy,
        events: &mut Vec<ServerEvent>,
        rng: &mut R,
    ) {
        if self.attack_cooldown > 0 {
            self.attack_cooldown -= 1;
            return;
        }

        if client.pos().distance(self.pos) >= ctx.config.melee_range {
            self.state = NpcState::Walk;
            return;
        }

        let config = ctx.config;
        let (min, max) = (config.min_damage.min(config.max_damage), config.max_damage.max(config.min_damage));
        let mut damage = rng.random_range(min..=max);
        let crit = rng.random_bool(config.crit_chance.clamp(0.0, 1.0));
        if crit {
            damage *= 2;
        }
        let hitpoints = client.take_damage(damage);

        events.push(ServerEvent::NpcAttackAnim { npc_uuid: self.uuid, attack_id: 0 });
        events.push(ServerEvent::UpdatePlayer {
            player_id: client.id,
            hitpoints,
            damage,
            heal: 0,
            crit,
        });
        self.attack_cooldown = config.attack_speed;
        self.move_cooldown = config.move_cooldown;
    }

    fn return_home(&mut self, ctx: &NpcContext<'_>, events: &mut Vec<ServerEvent>) {
        self.pos = self.pos.step_towards(self.spawn, ctx.config.step_size);
        events.push(self.position_event(ctx));

        if self.spawn.distance(self.pos) <= ctx.config.return_radius {
            self.state = NpcState::Idle;
            if self.hitpoints.current != self.hitpoints.max {
                self.hitpoints.restore();
                events.push(self.healed_event(ctx));
            }
        }
    }

    /// Apply a player's hit. Returns true if the NPC died.
    pub fn take_hit(&mut self, cell_key: &str, damage: i32, events: &mut Vec<ServerEvent>) -> bool {
        self.hitpoints.take_damage(damage);
        self.remove = self.hitpoints.is_depleted();
        events.push(ServerEvent::UpdateNpc {
            grid_cell_key: cell_key.to_string(),
            npc_uuid: self.uuid,
            hitpoints: self.hitpoints,
            remove: self.remove,
            damage,
        });
        self.remove
    }

    fn position_event(&self, ctx: &NpcContext<'_>) -> ServerEvent {
        ServerEvent::NpcTargetPosition {
            grid_cell_key: ctx.cell_key.to_string(),
            npc_uuid: self.uuid,
            pos: self.pos,
        }
    }

    fn healed_event(&self, ctx: &NpcContext<'_>) -> ServerEvent {
        ServerEvent::UpdateNpc {
            grid_cell_key: ctx.cell_key.to_string(),
            npc_uuid: self.uuid,
            hitpoints: self.hitpoints,
            remove: false,
            damage: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::PlayerRecord;
    use crate::world::CellCoord;
    use tokio::sync::mpsc;

    fn client(id: u32, pos: Vector) -> (Arc<ClientProxy>, mpsc::Receiver<ServerEvent>) {
        let record = PlayerRecord::fresh(pos, Hitpoints::full(100), 0);
        let (proxy, rx) = ClientProxy::new(id, Uuid::new_v4(), record, CellCoord::new(0, 0), 8);
        (Arc::new(proxy), rx)
    }

    fn subs(clients: &[&Arc<ClientProxy>]) -> HashMap<u32, Subscription> {
        clients
            .iter()
            .map(|c| (c.id, Subscription { client: Arc::clone(c), tick: 0 }))
            .collect()
    }

    fn step(npc: &mut Npc, config: &NpcConfig, subscriptions: &HashMap<u32, Subscription>) -> Vec<ServerEvent> {
        let ctx = NpcContext { config, cell_key: "0#0", subscriptions };
        let mut events = Vec::new();
        npc.update(&ctx, &mut events, &mut rand::rng());
        events
    }

    #[test]
    fn test_aggro_within_radius() {
        let config = NpcConfig::default();
        let (near, _rx) = client(1, Vector::new(100, 0));
        let subscriptions = subs(&[&near]);
        let mut npc = Npc::new(Vector::ZERO, 250);

        let events = step(&mut npc, &config, &subscriptions);
        assert!(events.is_empty());
        assert_eq!(npc.target, Some(1));
        assert_eq!(npc.state, NpcState::Idle);

        step(&mut npc, &config, &subscriptions);
        assert_eq!(npc.state, NpcState::Walk);
    }

    #[test]
    fn test_no_aggro_outside_radius() {
        let config = NpcConfig::default();
        let (far, _rx) = client(1, Vector::new(200, 0));
        let subscriptions = subs(&[&far]);
        let mut npc = Npc::new(Vector::ZERO, 250);

        for _ in 0..10 {
            step(&mut npc, &config, &subscriptions);
        }
        assert_eq!(npc.target, None);
        assert_eq!(npc.state, NpcState::Idle);
        assert_eq!(npc.pos, Vector::ZERO);
    }

    #[test]
    fn test_nearest_target_wins() {
        let config = NpcConfig::default();
        let (a, _rx_a) = client(1, Vector::new(120, 0));
        let (b, _rx_b) = client(2, Vector::new(0, 60));
        let subscriptions = subs(&[&a, &b]);
        let mut npc = Npc::new(Vector::ZERO, 250);

        step(&mut npc, &config, &subscriptions);
        assert_eq!(npc.target, Some(2));
    }

    #[test]
    fn test_leash_sends_home_healed() {
        let config = NpcConfig::default();
        let (runner, _rx) = client(1, Vector::new(700, 0));
        let subscriptions = subs(&[&runner]);
        let mut npc = Npc::new(Vector::ZERO, 250);
        npc.pos = Vector::new(490, 0);
        npc.hitpoints.take_damage(100);
        npc.state = NpcState::Walk;
        npc.target = Some(1);

        let events = step(&mut npc, &config, &subscriptions);
        assert_eq!(npc.pos, Vector::new(515, 0));
        assert_eq!(npc.state, NpcState::Returning);
        assert_eq!(npc.target, None);
        assert_eq!(npc.hitpoints, Hitpoints::full(250));
        assert!(matches!(events[0], ServerEvent::NpcTargetPosition { .. }));
        assert!(matches!(events[1], ServerEvent::UpdateNpc { remove: false, .. }));
    }

    #[test]
    fn test_walk_rests_between_steps() {
        let config = NpcConfig::default();
        let (target, _rx) = client(1, Vector::new(140, 0));
        let subscriptions = subs(&[&target]);
        let mut npc = Npc::new(Vector::ZERO, 250);
        npc.state = NpcState::Walk;
        npc.target = Some(1);

        step(&mut npc, &config, &subscriptions);
        assert_eq!(npc.pos, Vector::new(25, 0));
        assert_eq!(npc.state, NpcState::Idle);
        assert_eq!(npc.move_cooldown, 2);
    }

    #[test]
    fn test_attack_damages_target() {
        let config = NpcConfig::default();
        let (victim, _rx) = client(1, Vector::new(30, 0));
        let subscriptions = subs(&[&victim]);
        let mut npc = Npc::new(Vector::ZERO, 250);
        npc.state = NpcState::Attack;
        npc.target = Some(1);

        let events = step(&mut npc, &config, &subscriptions);
        assert_eq!(events.len(), 2);
        let ServerEvent::UpdatePlayer { player_id, hitpoints, damage, crit, .. } = &events[1] else {
            panic!("expected UpdatePlayer, got {:?}", events[1]);
        };
        assert_eq!(*player_id, 1);
        let expected = if *crit { 40..=70 } else { 20..=35 };
        assert!(expected.contains(damage));
        assert_eq!(hitpoints.current, 100 - damage);
        assert_eq!(npc.attack_cooldown, config.attack_speed);
        assert_eq!(npc.move_cooldown, config.move_cooldown);

        // Cooling down: nothing happens.
        assert!(step(&mut npc, &config, &subscriptions).is_empty());
    }

    #[test]
    fn test_rests_before_chasing_after_attack() {
        let config = NpcConfig::default();
        let (victim, _rx) = client(1, Vector::new(30, 0));
        let subscriptions = subs(&[&victim]);
        let mut npc = Npc::new(Vector::ZERO, 250);
        npc.state = NpcState::Attack;
        npc.target = Some(1);

        step(&mut npc, &config, &subscriptions);
        npc.attack_cooldown = 0;
        victim.set_pos(Vector::new(200, 0));

        step(&mut npc, &config, &subscriptions);
        assert_eq!(npc.state, NpcState::Walk);
        for _ in 0..config.move_cooldown {
            assert!(step(&mut npc, &config, &subscriptions).is_empty());
            assert_eq!(npc.pos, Vector::ZERO);
        }
        let events = step(&mut npc, &config, &subscriptions);
        assert_eq!(npc.pos, Vector::new(25, 0));
        assert!(matches!(events[0], ServerEvent::NpcTargetPosition { .. }));
    }

    #[test]
    fn test_lost_target_returns() {
        let config = NpcConfig::default();
        let (gone, _rx) = client(1, Vector::new(30, 0));
        let subscriptions = subs(&[&gone]);
        let mut npc = Npc::new(Vector::ZERO, 250);
        npc.state = NpcState::Attack;
        npc.target = Some(1);
        gone.disconnect();

        let events = step(&mut npc, &config, &subscriptions);
        assert!(events.is_empty());
        assert_eq!(npc.target, None);
        assert_eq!(npc.state, NpcState::Returning);
    }

    #[test]
    fn test_returning_reaches_spawn() {
        let config = NpcConfig::default();
        let subscriptions = HashMap::new();
        let mut npc = Npc::new(Vector::ZERO, 250);
        npc.pos = Vector::new(60, 0);
        npc.state = NpcState::Returning;

        step(&mut npc, &config, &subscriptions);
        assert_eq!(npc.pos, Vector::new(35, 0));
        assert_eq!(npc.state, NpcState::Idle);
    }

    #[test]
    fn test_take_hit_kills() {
        let mut npc = Npc::new(Vector::ZERO, 50);
        let mut events = Vec::new();
        assert!(!npc.take_hit("0#0", 34, &mut events));
        assert!(npc.take_hit("0#0", 34, &mut events));
        assert!(npc.remove);
        assert_eq!(npc.hitpoints.current, 0);
        assert!(matches!(events[1], ServerEvent::UpdateNpc { remove: true, damage: 34, .. }));
    }
}
