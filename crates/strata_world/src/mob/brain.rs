//! Per-type mob behaviour.
//!
//! A brain never touches the world directly. It mutates the mob's row and
//! returns [`BrainEffect`]s; the world turns those into drops, inventory
//! changes and sounds.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use strata_persistence::EntityRow;
use strata_shared::block_id as id;
use strata_shared::{ItemStack, Vec3};

/// Ticks a hurt mob keeps fleeing.
pub const PANIC_TICKS: i64 = 60;

/// Something a brain wants the world to do.
#[derive(Clone, Debug, PartialEq)]
pub enum BrainEffect {
    /// Spawn a drop at the mob.
    Drop(Vec<ItemStack>),
    /// Replace the acting player's held item.
    ReplaceHeld(ItemStack),
    /// Play a sound at the mob.
    Sound(&'static str),
}

/// Behaviour of one mob type.
pub trait Brain: Send {
    /// Mob type tag.
    fn kind(&self) -> &'static str;

    /// One simulation step.
    fn tick(&mut self, mob: &mut EntityRow, rng: &mut ChaCha8Rng) -> Vec<BrainEffect> {
        wander(mob, rng);
        Vec::new()
    }

    /// A player used an item on the mob.
    fn on_use(&mut self, _mob: &mut EntityRow, _held: Option<&ItemStack>) -> Vec<BrainEffect> {
        Vec::new()
    }

    /// The mob was hurt.
    fn on_damage(&mut self, mob: &mut EntityRow) -> Vec<BrainEffect> {
        set_extra(mob, "panic", json!(PANIC_TICKS));
        vec![BrainEffect::Sound("hurt")]
    }

    /// The mob died.
    fn on_kill(&mut self, _mob: &mut EntityRow) -> Vec<BrainEffect> {
        Vec::new()
    }
}

pub(crate) fn extra_int(mob: &EntityRow, key: &str) -> i64 {
    mob.extra_data.get(key).and_then(Value::as_i64).unwrap_or(0)
}

pub(crate) fn extra_flag(mob: &EntityRow, key: &str) -> bool {
    mob.extra_data.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn set_extra(mob: &mut EntityRow, key: &str, value: Value) {
    if !mob.extra_data.is_object() {
        mob.extra_data = json!({});
    }
    if let Some(map) = mob.extra_data.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

/// Counts down panic and occasionally turns the mob.
fn wander(mob: &mut EntityRow, rng: &mut ChaCha8Rng) {
    let panic = extra_int(mob, "panic");
    if panic > 0 {
        set_extra(mob, "panic", json!(panic - 1));
    }
    let chance = if panic > 0 { 0.25 } else { 0.01 };
    if rng.gen_bool(chance) {
        mob.rotate.z = rng.gen_range(0.0..std::f64::consts::TAU);
    }
}

/// Lays eggs, drops feathers.
#[derive(Default)]
pub struct ChickenBrain;

/// Ticks between two eggs, lower bound.
const EGG_MIN_TICKS: i64 = 6_000;

impl Brain for ChickenBrain {
    fn kind(&self) -> &'static str {
        "chicken"
    }

    fn tick(&mut self, mob: &mut EntityRow, rng: &mut ChaCha8Rng) -> Vec<BrainEffect> {
        wander(mob, rng);
        let left = extra_int(mob, "egg_timer");
        if left > 1 {
            set_extra(mob, "egg_timer", json!(left - 1));
            return Vec::new();
        }
        let next = rng.gen_range(EGG_MIN_TICKS..EGG_MIN_TICKS * 2);
        set_extra(mob, "egg_timer", json!(next));
        if left == 1 {
            return vec![
                BrainEffect::Drop(vec![ItemStack::new(id::EGG, 1)]),
                BrainEffect::Sound("lay_egg"),
            ];
        }
        Vec::new()
    }

    fn on_kill(&mut self, _mob: &mut EntityRow) -> Vec<BrainEffect> {
        vec![BrainEffect::Drop(vec![ItemStack::new(id::FEATHER, 1)])]
    }
}

/// Gives milk.
#[derive(Default)]
pub struct CowBrain;

impl Brain for CowBrain {
    fn kind(&self) -> &'static str {
        "cow"
    }

    fn on_use(&mut self, _mob: &mut EntityRow, held: Option<&ItemStack>) -> Vec<BrainEffect> {
        match held {
            Some(item) if item.id == id::BUCKET => vec![
                BrainEffect::ReplaceHeld(ItemStack::new(id::MILK_BUCKET, 1)),
                BrainEffect::Sound("milk"),
            ],
            _ => Vec::new(),
        }
    }
}

/// Grows wool back after shearing.
#[derive(Default)]
pub struct SheepBrain;

/// Ticks until sheared wool grows back.
const WOOL_REGROW_TICKS: i64 = 1_200;

impl Brain for SheepBrain {
    fn kind(&self) -> &'static str {
        "sheep"
    }

    fn tick(&mut self, mob: &mut EntityRow, rng: &mut ChaCha8Rng) -> Vec<BrainEffect> {
        wander(mob, rng);
        if extra_flag(mob, "sheared") {
            let regrow = extra_int(mob, "regrow") + 1;
            if regrow >= WOOL_REGROW_TICKS {
                set_extra(mob, "sheared", json!(false));
                set_extra(mob, "regrow", json!(0));
            } else {
                set_extra(mob, "regrow", json!(regrow));
            }
        }
        Vec::new()
    }

    fn on_use(&mut self, mob: &mut EntityRow, held: Option<&ItemStack>) -> Vec<BrainEffect> {
        let shears = held.is_some_and(|h| h.id == id::SHEARS);
        if !shears || extra_flag(mob, "sheared") {
            return Vec::new();
        }
        set_extra(mob, "sheared", json!(true));
        set_extra(mob, "regrow", json!(0));
        vec![
            BrainEffect::Drop(vec![ItemStack::new(id::WHITE_WOOL, 2)]),
            BrainEffect::Sound("shear"),
        ]
    }

    fn on_kill(&mut self, mob: &mut EntityRow) -> Vec<BrainEffect> {
        if extra_flag(mob, "sheared") {
            return Vec::new();
        }
        vec![BrainEffect::Drop(vec![ItemStack::new(id::WHITE_WOOL, 1)])]
    }
}

/// Collects pollen over time.
#[derive(Default)]
pub struct BeeBrain;

/// Pollen a bee can carry.
pub const MAX_POLLEN: i64 = 3;

/// Ticks per collected pollen.
const POLLEN_TICKS: u64 = 200;

impl Brain for BeeBrain {
    fn kind(&self) -> &'static str {
        "bee"
    }

    fn tick(&mut self, mob: &mut EntityRow, rng: &mut ChaCha8Rng) -> Vec<BrainEffect> {
        wander(mob, rng);
        let pollen = extra_int(mob, "pollen");
        if pollen < MAX_POLLEN && rng.gen_range(0..POLLEN_TICKS) == 0 {
            set_extra(mob, "pollen", json!(pollen + 1));
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use strata_persistence::Indicators;

    fn row(kind: &str) -> EntityRow {
        EntityRow {
            id: 1,
            entity_id: "e".into(),
            kind: kind.into(),
            skin: "base".into(),
            pos: Vec3::ZERO,
            pos_spawn: Vec3::ZERO,
            rotate: Vec3::ZERO,
            indicators: Indicators::default(),
            extra_data: json!({}),
            is_active: true,
        }
    }

    #[test]
    fn test_cow_fills_bucket() {
        let mut cow = CowBrain;
        let mut mob = row("cow");
        let effects = cow.on_use(&mut mob, Some(&ItemStack::new(id::BUCKET, 1)));
        assert_eq!(effects[0], BrainEffect::ReplaceHeld(ItemStack::new(id::MILK_BUCKET, 1)));
        assert!(cow.on_use(&mut mob, None).is_empty());
    }

    #[test]
    fn test_sheep_shears_once_then_regrows() {
        let mut sheep = SheepBrain;
        let mut mob = row("sheep");
        let shears = ItemStack::new(id::SHEARS, 1);
        assert_eq!(sheep.on_use(&mut mob, Some(&shears)).len(), 2);
        assert!(sheep.on_use(&mut mob, Some(&shears)).is_empty());

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..WOOL_REGROW_TICKS {
            sheep.tick(&mut mob, &mut rng);
        }
        assert!(!extra_flag(&mob, "sheared"));
    }

    #[test]
    fn test_damage_sets_panic_that_wears_off() {
        let mut chicken = ChickenBrain;
        let mut mob = row("chicken");
        chicken.on_damage(&mut mob);
        assert_eq!(extra_int(&mob, "panic"), PANIC_TICKS);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..PANIC_TICKS {
            chicken.tick(&mut mob, &mut rng);
        }
        assert_eq!(extra_int(&mob, "panic"), 0);
    }

    #[test]
    fn test_chicken_lays_eggs() {
        let mut chicken = ChickenBrain;
        let mut mob = row("chicken");
        set_extra(&mut mob, "egg_timer", json!(2));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(chicken.tick(&mut mob, &mut rng).is_empty());
        let effects = chicken.tick(&mut mob, &mut rng);
        assert_eq!(effects[0], BrainEffect::Drop(vec![ItemStack::new(id::EGG, 1)]));
        assert!(extra_int(&mob, "egg_timer") >= EGG_MIN_TICKS);
    }

    #[test]
    fn test_bee_pollen_is_capped() {
        let mut bee = BeeBrain;
        let mut mob = row("bee");
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..20_000 {
            bee.tick(&mut mob, &mut rng);
        }
        assert_eq!(extra_int(&mob, "pollen"), MAX_POLLEN);
    }
}
