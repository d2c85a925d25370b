//! Per-agent component records.
//!
//! Components are plain data; an agent possesses a subset of them. The store
//! owns every committed value, systems mutate through store setters only.
//! Map-like fields use `BTreeMap` so iteration (and therefore serialization)
//! order is stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{AgentId, AnimalId, LineageId, Position, ZoneId};

// ============================================================================
// PROFILE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

/// One-way life stage progression: child -> adult -> elder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    Child,
    Adult,
    Elder,
}

/// Personality traits, each in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitSet {
    pub cooperation: f32,
    pub aggression: f32,
    pub diligence: f32,
    pub curiosity: f32,
}

impl Default for TraitSet {
    fn default() -> Self {
        Self {
            cooperation: 0.5,
            aggression: 0.3,
            diligence: 0.5,
            curiosity: 0.5,
        }
    }
}

impl TraitSet {
    /// Average of two parents, used for inheritance before mutation
    pub fn blend(a: &TraitSet, b: &TraitSet) -> TraitSet {
        TraitSet {
            cooperation: (a.cooperation + b.cooperation) / 2.0,
            aggression: (a.aggression + b.aggression) / 2.0,
            diligence: (a.diligence + b.diligence) / 2.0,
            curiosity: (a.curiosity + b.curiosity) / 2.0,
        }
    }

    /// Apply a bounded mutation to every trait, clamping to [0, 1]
    pub fn mutate(&mut self, amounts: [f32; 4]) {
        self.cooperation = (self.cooperation + amounts[0]).clamp(0.0, 1.0);
        self.aggression = (self.aggression + amounts[1]).clamp(0.0, 1.0);
        self.diligence = (self.diligence + amounts[2]).clamp(0.0, 1.0);
        self.curiosity = (self.curiosity + amounts[3]).clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub sex: Sex,
    pub age_years: f32,
    pub life_stage: LifeStage,
    pub generation: u32,
    pub immortal: bool,
    pub dead: bool,
    pub traits: TraitSet,
    pub appearance: Option<String>,
    pub parents: Option<(AgentId, AgentId)>,
}

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
    /// Points regenerated per second while alive and recently undamaged
    pub regen_per_second: f32,
    pub last_damage_at: u64,
    pub is_dead: bool,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self {
            current: max,
            max,
            regen_per_second: 0.5,
            last_damage_at: 0,
            is_dead: false,
        }
    }

    /// Apply damage, clamping to [0, max]. Marks death at zero.
    pub fn apply_damage(&mut self, amount: f32, now: u64) {
        self.current = (self.current - amount).clamp(0.0, self.max);
        self.last_damage_at = now;
        if self.current <= 0.0 {
            self.current = 0.0;
            self.is_dead = true;
        }
    }

    pub fn heal(&mut self, amount: f32) {
        if !self.is_dead {
            self.current = (self.current + amount).clamp(0.0, self.max);
        }
    }
}

// ============================================================================
// NEEDS
// ============================================================================

/// The seven tracked needs; values live in [0, 100], 100 = sated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedKind {
    Hunger,
    Thirst,
    Energy,
    Hygiene,
    Social,
    Fun,
    MentalHealth,
}

impl NeedKind {
    pub const ALL: [NeedKind; 7] = [
        NeedKind::Hunger,
        NeedKind::Thirst,
        NeedKind::Energy,
        NeedKind::Hygiene,
        NeedKind::Social,
        NeedKind::Fun,
        NeedKind::MentalHealth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NeedKind::Hunger => "hunger",
            NeedKind::Thirst => "thirst",
            NeedKind::Energy => "energy",
            NeedKind::Hygiene => "hygiene",
            NeedKind::Social => "social",
            NeedKind::Fun => "fun",
            NeedKind::MentalHealth => "mental_health",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Needs {
    pub hunger: f32,
    pub thirst: f32,
    pub energy: f32,
    pub hygiene: f32,
    pub social: f32,
    pub fun: f32,
    pub mental_health: f32,
}

impl Default for Needs {
    fn default() -> Self {
        Self {
            hunger: 100.0,
            thirst: 100.0,
            energy: 100.0,
            hygiene: 80.0,
            social: 100.0,
            fun: 100.0,
            mental_health: 80.0,
        }
    }
}

impl Needs {
    pub fn get(&self, kind: NeedKind) -> f32 {
        match kind {
            NeedKind::Hunger => self.hunger,
            NeedKind::Thirst => self.thirst,
            NeedKind::Energy => self.energy,
            NeedKind::Hygiene => self.hygiene,
            NeedKind::Social => self.social,
            NeedKind::Fun => self.fun,
            NeedKind::MentalHealth => self.mental_health,
        }
    }

    /// Set a need, clamped to [0, 100]
    pub fn set(&mut self, kind: NeedKind, value: f32) {
        let value = value.clamp(0.0, 100.0);
        match kind {
            NeedKind::Hunger => self.hunger = value,
            NeedKind::Thirst => self.thirst = value,
            NeedKind::Energy => self.energy = value,
            NeedKind::Hygiene => self.hygiene = value,
            NeedKind::Social => self.social = value,
            NeedKind::Fun => self.fun = value,
            NeedKind::MentalHealth => self.mental_health = value,
        }
    }

    pub fn change(&mut self, kind: NeedKind, delta: f32) {
        self.set(kind, self.get(kind) + delta);
    }

    /// The lowest need and its value
    pub fn worst(&self) -> (NeedKind, f32) {
        let mut worst = (NeedKind::Hunger, self.hunger);
        for kind in NeedKind::ALL {
            let value = self.get(kind);
            if value < worst.1 {
                worst = (kind, value);
            }
        }
        worst
    }
}

// ============================================================================
// TRANSFORM & MOVEMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Position,
    pub rotation: f32,
    pub zone_id: Option<ZoneId>,
    pub biome: Option<String>,
}

impl Transform {
    pub fn at(position: Position) -> Self {
        Self {
            position,
            rotation: 0.0,
            zone_id: None,
            biome: None,
        }
    }
}

/// What a movement request is aimed at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveTarget {
    Point(Position),
    Zone(ZoneId),
    Entity(AgentId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub is_moving: bool,
    pub target: Option<MoveTarget>,
    pub waypoints: Vec<Position>,
    pub waypoint_index: usize,
    pub speed: f32,
    pub base_speed: f32,
    /// Accumulated fatigue in [0, 1]; scales speed down
    pub fatigue: f32,
}

impl Movement {
    pub fn stationary(base_speed: f32) -> Self {
        Self {
            is_moving: false,
            target: None,
            waypoints: Vec::new(),
            waypoint_index: 0,
            speed: base_speed,
            base_speed,
            fatigue: 0.0,
        }
    }

    pub fn clear_target(&mut self) {
        self.is_moving = false;
        self.target = None;
        self.waypoints.clear();
        self.waypoint_index = 0;
    }
}

// ============================================================================
// INVENTORY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: BTreeMap<String, ItemStack>,
    /// Maximum carry weight
    pub capacity: f32,
    /// Invariant: sum of quantity x item weight over all stacks
    pub current_load: f32,
    pub money: f32,
}

impl Inventory {
    pub fn with_capacity(capacity: f32, money: f32) -> Self {
        Self {
            items: BTreeMap::new(),
            capacity,
            current_load: 0.0,
            money,
        }
    }

    pub fn quantity(&self, item: &str) -> u32 {
        self.items.get(item).map(|stack| stack.quantity).unwrap_or(0)
    }
}

// ============================================================================
// COMBAT
// ============================================================================

/// What an agent is currently fighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatTarget {
    Agent(AgentId),
    Animal(AnimalId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combat {
    pub is_in_combat: bool,
    pub current_target: Option<ThreatTarget>,
    pub last_attack_at: u64,
    pub cooldown_ms: u64,
    pub base_damage: f32,
    pub base_defense: f32,
    /// Accumulated threat per attacker id
    pub threat: BTreeMap<AgentId, f32>,
    pub aggressive: bool,
    /// Equipped weapon id; `None` means unarmed
    pub equipped_weapon: Option<String>,
}

impl Combat {
    pub fn noncombatant(base_damage: f32, cooldown_ms: u64) -> Self {
        Self {
            is_in_combat: false,
            current_target: None,
            last_attack_at: 0,
            cooldown_ms,
            base_damage,
            base_defense: 1.0,
            threat: BTreeMap::new(),
            aggressive: false,
            equipped_weapon: None,
        }
    }
}

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Idle,
    Gatherer,
    Farmer,
    Guard,
    Crafter,
    Builder,
    Merchant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub role_type: RoleType,
    pub work_zone_id: Option<ZoneId>,
    pub on_duty: bool,
    pub work_start_hour: u8,
    pub work_end_hour: u8,
    pub efficiency: f32,
}

impl Default for Role {
    fn default() -> Self {
        Self {
            role_type: RoleType::Idle,
            work_zone_id: None,
            on_duty: false,
            work_start_hour: 8,
            work_end_hour: 18,
            efficiency: 1.0,
        }
    }
}

// ============================================================================
// SOCIAL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Family,
    Partner,
    Friend,
    Rival,
    Acquaintance,
}

/// A notable relationship as seen from one agent. The affinity here is the
/// viewer-facing [-100, 100] projection of the canonical social graph edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub affinity: f32,
    pub last_interaction: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Social {
    pub relationships: BTreeMap<AgentId, Relationship>,
    pub family_id: Option<LineageId>,
    pub partner_id: Option<AgentId>,
    pub mood: f32,
    pub last_social_interaction: u64,
}

impl Default for Social {
    fn default() -> Self {
        Self {
            relationships: BTreeMap::new(),
            family_id: None,
            partner_id: None,
            mood: 0.5,
            last_social_interaction: 0,
        }
    }
}

// ============================================================================
// AI STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiState {
    /// Id of the task currently held active in the task queue
    pub current_task: Option<String>,
    pub task_started_at: u64,
    pub last_decision_at: u64,
    pub processing: bool,
}

// ============================================================================
// GENERIC COMPONENT ACCESS
// ============================================================================

/// Names of the component slots an agent may possess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Profile,
    Health,
    Needs,
    Transform,
    Movement,
    Inventory,
    Combat,
    Role,
    Social,
    Ai,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 10] = [
        ComponentKind::Profile,
        ComponentKind::Health,
        ComponentKind::Needs,
        ComponentKind::Transform,
        ComponentKind::Movement,
        ComponentKind::Inventory,
        ComponentKind::Combat,
        ComponentKind::Role,
        ComponentKind::Social,
        ComponentKind::Ai,
    ];
}

/// A component value with its tag, for bulk and serialized access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum Component {
    Profile(Profile),
    Health(Health),
    Needs(Needs),
    Transform(Transform),
    Movement(Movement),
    Inventory(Inventory),
    Combat(Combat),
    Role(Role),
    Social(Social),
    Ai(AiState),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Profile(_) => ComponentKind::Profile,
            Component::Health(_) => ComponentKind::Health,
            Component::Needs(_) => ComponentKind::Needs,
            Component::Transform(_) => ComponentKind::Transform,
            Component::Movement(_) => ComponentKind::Movement,
            Component::Inventory(_) => ComponentKind::Inventory,
            Component::Combat(_) => ComponentKind::Combat,
            Component::Role(_) => ComponentKind::Role,
            Component::Social(_) => ComponentKind::Social,
            Component::Ai(_) => ComponentKind::Ai,
        }
    }
}
