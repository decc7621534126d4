//! # Block Registry
//!
//! Static material properties consulted by the interaction handlers, the
//! destroy cascade, explosions and chunk ticking.
//!
//! ## Design
//!
//! A material is plain data. Behaviour that depends on a material (what a
//! click does, what drops) lives in the handlers and keys off the [`Tag`]s
//! and rules recorded here, so adding a block never means adding a branch to
//! the pipeline.

use std::collections::HashMap;

use serde_json::{json, Value};
use strata_shared::block_id as id;
use strata_shared::{BlockItem, BlockPos};

/// Behaviour markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Never drops anything when destroyed.
    NoDrop,
    /// Grows on grass or farmland; destroyed with the block below.
    Plant,
    /// Needs farmland underneath.
    NeedsFarmland,
    /// Flower pot.
    Pot,
    /// Fits into a flower pot.
    CanPutIntoPot,
    /// Two-part bed.
    Bed,
    /// Opens and closes.
    Door,
    /// Holds editable text.
    Sign,
    /// Holds a music disc.
    Jukebox,
    /// Music disc item.
    Disc,
    /// Toggles when pressed.
    Button,
    /// Can be fused.
    Tnt,
    /// Stairs can be sat on.
    Stairs,
    /// Eaten piece by piece.
    Cake,
    /// Nothing can be placed on its top face.
    NoSetOnTop,
    /// Only placed against a ceiling.
    PlaceOnlyToCeil,
    /// Needs a full solid face to attach to.
    OnlyFullFace,
    /// Torch placement rules.
    Torch,
    /// Ladder placement rules.
    Ladder,
    /// Inventory-bearing block.
    Container,
    /// Fluid source or flow.
    Fluid,
    /// Ignores destroy requests.
    Indestructible,
    /// Held item turns into an empty bucket once used.
    EmptiesToBucket,
}

/// What a destroyed block leaves behind.
#[derive(Clone, Debug, PartialEq)]
pub enum DropRule {
    /// One of itself when the material is spawnable.
    SelfDrop,
    /// Nothing.
    Nothing,
    /// Another item with a chance; the count is picked from `counts`.
    Item {
        /// Dropped item id
        id: u16,
        /// Probability in `0..=1`
        chance: f64,
        /// Candidate counts
        counts: Vec<u32>,
    },
    /// Crop drops depending on `extra.complete`.
    Seeds {
        /// `(item, min, max)` when fully grown
        complete: Vec<(u16, u32, u32)>,
        /// `(item, min, max)` otherwise
        incomplete: Vec<(u16, u32, u32)>,
    },
}

/// Link to another part of a multi-block structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Part {
    /// Block id of the part
    pub id: u16,
    /// Offset of the part from this block
    pub offset: BlockPos,
}

/// Stackable layers such as snow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layering {
    /// Layers before the voxel is full
    pub max_layers: i64,
}

/// Tool behaviour of an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instrument {
    /// Paths grass, puts out campfires.
    Shovel,
    /// Tills grass and dirt.
    Hoe,
    /// Fuses TNT.
    Igniter,
}

/// Scheduled per-block work for ticking chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickingRule {
    /// Ticks between two steps
    pub interval: u32,
    /// Step kind
    pub kind: TickingKind,
}

/// Per-block ticking step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickingKind {
    /// `extra.stage` grows to `max_stage`, then the block becomes `grown`
    /// or is flagged `complete`.
    Growth {
        /// Final stage
        max_stage: i64,
        /// Replacement once grown
        grown: Option<u16>,
    },
    /// `extra.fuel` burns down; the block goes out at zero.
    Burn,
}

/// Properties of one block or item id.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    /// Numeric id
    pub id: u16,
    /// Stable name
    pub name: &'static str,
    /// Inventory-only item
    pub is_item: bool,
    /// Keeps an orientation
    pub can_rotate: bool,
    /// Entities walk through it
    pub passable: bool,
    /// Placement may overwrite it
    pub replaceable: bool,
    /// Light passes
    pub transparent: bool,
    /// Drops itself by default
    pub spawnable: bool,
    /// Drops when blown up
    pub can_auto_drop: bool,
    /// Explosion power needed to remove it
    pub blast_resistance: f64,
    /// Behaviour markers
    pub tags: Vec<Tag>,
    /// Destroy drop rule
    pub drop: DropRule,
    /// Part above/after this one
    pub next_part: Option<Part>,
    /// Part below/before this one
    pub previous_part: Option<Part>,
    /// Block ids destroyed together with this one when directly below it
    pub destroy_to_down: Vec<u16>,
    /// Layer stacking
    pub layering: Option<Layering>,
    /// Client window opened on use
    pub window: Option<&'static str>,
    /// Tool behaviour
    pub instrument: Option<Instrument>,
    /// Bucket item produced when scooping this block
    pub fill_bucket: Option<u16>,
    /// Block placed when this item is used
    pub places: Option<u16>,
    /// `(mob type, skin)` spawned by this egg
    pub spawn_egg: Option<(&'static str, &'static str)>,
    /// Extra state given to freshly placed blocks
    pub default_extra: Option<Value>,
    /// Scheduled per-block work
    pub ticking: Option<TickingRule>,
}

impl Material {
    /// Solid, spawnable block with default properties.
    #[must_use]
    pub fn block(id: u16, name: &'static str) -> Self {
        Self {
            id,
            name,
            is_item: false,
            can_rotate: false,
            passable: false,
            replaceable: false,
            transparent: false,
            spawnable: true,
            can_auto_drop: false,
            blast_resistance: 1.0,
            tags: Vec::new(),
            drop: DropRule::SelfDrop,
            next_part: None,
            previous_part: None,
            destroy_to_down: Vec::new(),
            layering: None,
            window: None,
            instrument: None,
            fill_bucket: None,
            places: None,
            spawn_egg: None,
            default_extra: None,
            ticking: None,
        }
    }

    /// Inventory-only item.
    #[must_use]
    pub fn item(id: u16, name: &'static str) -> Self {
        let mut m = Self::block(id, name);
        m.is_item = true;
        m.passable = true;
        m
    }

    /// Returns true if the material carries `tag`.
    #[inline]
    #[must_use]
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Returns true for air.
    #[inline]
    #[must_use]
    pub const fn is_air(&self) -> bool {
        self.id == id::AIR
    }

    /// Returns true for anything an entity cannot walk through.
    #[inline]
    #[must_use]
    pub const fn is_solid(&self) -> bool {
        !self.is_air() && !self.passable && !self.is_item
    }
}

/// Id → material lookup.
pub struct BlockRegistry {
    materials: HashMap<u16, Material>,
    unknown: Material,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl BlockRegistry {
    /// Registry without materials; every lookup yields the unknown material.
    #[must_use]
    pub fn empty() -> Self {
        let mut unknown = Material::block(u16::MAX, "unknown");
        unknown.spawnable = false;
        unknown.drop = DropRule::Nothing;
        Self {
            materials: HashMap::new(),
            unknown,
        }
    }

    /// Adds or replaces a material.
    pub fn register(&mut self, material: Material) {
        self.materials.insert(material.id, material);
    }

    /// Material of an id; unknown ids map to an inert placeholder.
    #[inline]
    #[must_use]
    pub fn get(&self, block_id: u16) -> &Material {
        self.materials.get(&block_id).unwrap_or(&self.unknown)
    }

    /// Returns true if the id is registered.
    #[must_use]
    pub fn contains(&self, block_id: u16) -> bool {
        self.materials.contains_key(&block_id)
    }

    /// Number of registered materials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Whether placing `with_id` may overwrite `target`.
    #[must_use]
    pub fn can_replace(&self, target: &BlockItem, with_id: u16) -> bool {
        if target.is_air() {
            return true;
        }
        let material = self.get(target.id);
        material.replaceable && target.id != with_id
    }

    /// The built-in material table.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn standard() -> Self {
        let mut r = Self::empty();

        let mut air = Material::block(id::AIR, "air");
        air.passable = true;
        air.replaceable = true;
        air.transparent = true;
        air.spawnable = false;
        air.drop = DropRule::Nothing;
        r.register(air);

        let mut bedrock = Material::block(id::BEDROCK, "bedrock");
        bedrock.blast_resistance = 3_600_000.0;
        bedrock.tags = vec![Tag::Indestructible, Tag::NoDrop];
        r.register(bedrock);

        let mut stone = Material::block(id::STONE, "stone");
        stone.blast_resistance = 4.0;
        r.register(stone);

        let mut dirt = Material::block(id::DIRT, "dirt");
        dirt.blast_resistance = 0.5;
        r.register(dirt);

        let mut grass = Material::block(id::GRASS_BLOCK, "grass_block");
        grass.blast_resistance = 0.6;
        grass.drop = DropRule::Item { id: id::DIRT, chance: 1.0, counts: vec![1] };
        r.register(grass);

        let mut sand = Material::block(id::SAND, "sand");
        sand.blast_resistance = 0.5;
        r.register(sand);

        for (water_id, name, tags) in [
            (id::STILL_WATER, "still_water", vec![Tag::Fluid, Tag::Indestructible, Tag::NoDrop]),
            (id::FLOWING_WATER, "flowing_water", vec![Tag::Fluid, Tag::NoDrop]),
        ] {
            let mut water = Material::block(water_id, name);
            water.passable = true;
            water.replaceable = true;
            water.transparent = true;
            water.spawnable = false;
            water.blast_resistance = 100.0;
            water.tags = tags;
            water.fill_bucket = Some(id::WATER_BUCKET);
            r.register(water);
        }

        let mut log = Material::block(id::OAK_LOG, "oak_log");
        log.can_rotate = true;
        log.blast_resistance = 2.0;
        r.register(log);

        let mut planks = Material::block(id::OAK_PLANKS, "oak_planks");
        planks.blast_resistance = 3.0;
        r.register(planks);

        let mut leaves = Material::block(id::OAK_LEAVES, "oak_leaves");
        leaves.transparent = true;
        leaves.blast_resistance = 0.2;
        leaves.drop = DropRule::Item { id: id::OAK_SAPLING, chance: 0.05, counts: vec![1] };
        r.register(leaves);

        let mut tall_grass = Material::block(id::TALL_GRASS, "tall_grass");
        tall_grass.passable = true;
        tall_grass.replaceable = true;
        tall_grass.transparent = true;
        tall_grass.blast_resistance = 0.0;
        tall_grass.tags = vec![Tag::Plant];
        tall_grass.drop = DropRule::Item { id: id::WHEAT_SEEDS, chance: 0.125, counts: vec![1] };
        r.register(tall_grass);

        let mut dandelion = Material::block(id::DANDELION, "dandelion");
        dandelion.passable = true;
        dandelion.transparent = true;
        dandelion.blast_resistance = 0.0;
        dandelion.can_auto_drop = true;
        dandelion.tags = vec![Tag::Plant, Tag::CanPutIntoPot];
        r.register(dandelion);

        let mut sapling = Material::block(id::OAK_SAPLING, "oak_sapling");
        sapling.passable = true;
        sapling.transparent = true;
        sapling.blast_resistance = 0.0;
        sapling.can_auto_drop = true;
        sapling.tags = vec![Tag::Plant, Tag::CanPutIntoPot];
        sapling.default_extra = Some(json!({ "stage": 0 }));
        sapling.ticking = Some(TickingRule {
            interval: 600,
            kind: TickingKind::Growth { max_stage: 3, grown: Some(id::OAK_LOG) },
        });
        r.register(sapling);

        let mut pot = Material::block(id::FLOWER_POT, "flower_pot");
        pot.transparent = true;
        pot.blast_resistance = 0.0;
        pot.can_auto_drop = true;
        pot.tags = vec![Tag::Pot];
        r.register(pot);

        let mut chest = Material::block(id::CHEST, "chest");
        chest.can_rotate = true;
        chest.blast_resistance = 2.5;
        chest.can_auto_drop = true;
        chest.window = Some("frmChest");
        chest.tags = vec![Tag::Container];
        r.register(chest);

        let mut furnace = Material::block(id::FURNACE, "furnace");
        furnace.can_rotate = true;
        furnace.blast_resistance = 3.5;
        furnace.window = Some("frmFurnace");
        furnace.ticking = Some(TickingRule { interval: 20, kind: TickingKind::Burn });
        r.register(furnace);

        let mut table = Material::block(id::CRAFTING_TABLE, "crafting_table");
        table.blast_resistance = 2.5;
        table.window = Some("frmCraft");
        r.register(table);

        let mut jukebox = Material::block(id::JUKEBOX, "jukebox");
        jukebox.blast_resistance = 6.0;
        jukebox.tags = vec![Tag::Jukebox];
        r.register(jukebox);

        let mut tnt = Material::block(id::TNT, "tnt");
        tnt.blast_resistance = 0.0;
        tnt.tags = vec![Tag::Tnt];
        r.register(tnt);

        let mut button = Material::block(id::STONE_BUTTON, "stone_button");
        button.can_rotate = true;
        button.passable = true;
        button.transparent = true;
        button.blast_resistance = 0.5;
        button.can_auto_drop = true;
        button.tags = vec![Tag::Button, Tag::OnlyFullFace];
        r.register(button);

        let mut door = Material::block(id::OAK_DOOR, "oak_door");
        door.can_rotate = true;
        door.transparent = true;
        door.blast_resistance = 3.0;
        door.tags = vec![Tag::Door];
        door.next_part = Some(Part { id: id::OAK_DOOR_TOP, offset: BlockPos::new(0, 1, 0) });
        r.register(door);

        let mut door_top = Material::block(id::OAK_DOOR_TOP, "oak_door_top");
        door_top.can_rotate = true;
        door_top.transparent = true;
        door_top.blast_resistance = 3.0;
        door_top.tags = vec![Tag::Door, Tag::NoDrop];
        door_top.previous_part = Some(Part { id: id::OAK_DOOR, offset: BlockPos::new(0, -1, 0) });
        r.register(door_top);

        let mut bed = Material::block(id::RED_BED, "red_bed");
        bed.can_rotate = true;
        bed.transparent = true;
        bed.blast_resistance = 0.2;
        bed.tags = vec![Tag::Bed];
        r.register(bed);

        let mut cake = Material::block(id::CAKE, "cake");
        cake.transparent = true;
        cake.blast_resistance = 0.5;
        cake.tags = vec![Tag::Cake, Tag::NoDrop, Tag::NoSetOnTop];
        cake.default_extra = Some(json!({ "pieces": 6 }));
        r.register(cake);

        let mut torch = Material::block(id::TORCH, "torch");
        torch.can_rotate = true;
        torch.passable = true;
        torch.transparent = true;
        torch.blast_resistance = 0.0;
        torch.can_auto_drop = true;
        torch.tags = vec![Tag::Torch];
        r.register(torch);

        let mut ladder = Material::block(id::LADDER, "ladder");
        ladder.can_rotate = true;
        ladder.passable = true;
        ladder.transparent = true;
        ladder.blast_resistance = 0.4;
        ladder.can_auto_drop = true;
        ladder.tags = vec![Tag::Ladder, Tag::OnlyFullFace];
        r.register(ladder);

        let mut sign = Material::block(id::OAK_SIGN, "oak_sign");
        sign.can_rotate = true;
        sign.passable = true;
        sign.transparent = true;
        sign.blast_resistance = 1.0;
        sign.can_auto_drop = true;
        sign.tags = vec![Tag::Sign];
        r.register(sign);

        let mut snow = Material::block(id::SNOW, "snow");
        snow.transparent = true;
        snow.blast_resistance = 0.1;
        snow.layering = Some(Layering { max_layers: 8 });
        snow.default_extra = Some(json!({ "layers": 1 }));
        r.register(snow);

        let mut wheat = Material::block(id::WHEAT, "wheat");
        wheat.passable = true;
        wheat.transparent = true;
        wheat.blast_resistance = 0.0;
        wheat.can_auto_drop = true;
        wheat.tags = vec![Tag::Plant, Tag::NeedsFarmland];
        wheat.default_extra = Some(json!({ "stage": 0 }));
        wheat.drop = DropRule::Seeds {
            complete: vec![(id::WHEAT_ITEM, 1, 1), (id::WHEAT_SEEDS, 0, 3)],
            incomplete: vec![(id::WHEAT_SEEDS, 1, 1)],
        };
        wheat.ticking = Some(TickingRule {
            interval: 400,
            kind: TickingKind::Growth { max_stage: 7, grown: None },
        });
        r.register(wheat);

        let mut farmland = Material::block(id::FARMLAND, "farmland");
        farmland.blast_resistance = 0.6;
        farmland.drop = DropRule::Item { id: id::DIRT, chance: 1.0, counts: vec![1] };
        r.register(farmland);

        let mut path = Material::block(id::DIRT_PATH, "dirt_path");
        path.blast_resistance = 0.65;
        path.drop = DropRule::Item { id: id::DIRT, chance: 1.0, counts: vec![1] };
        r.register(path);

        let mut campfire = Material::block(id::CAMPFIRE, "campfire");
        campfire.can_rotate = true;
        campfire.transparent = true;
        campfire.blast_resistance = 2.0;
        campfire.default_extra = Some(json!({ "active": true }));
        r.register(campfire);

        let mut chain = Material::block(id::CHAIN, "chain");
        chain.passable = true;
        chain.transparent = true;
        chain.blast_resistance = 6.0;
        chain.can_auto_drop = true;
        chain.tags = vec![Tag::PlaceOnlyToCeil];
        chain.destroy_to_down = vec![id::CHAIN, id::LANTERN];
        r.register(chain);

        let mut lantern = Material::block(id::LANTERN, "lantern");
        lantern.transparent = true;
        lantern.blast_resistance = 3.5;
        lantern.can_auto_drop = true;
        lantern.tags = vec![Tag::NoSetOnTop];
        r.register(lantern);

        let mut glass = Material::block(id::GLASS, "glass");
        glass.transparent = true;
        glass.blast_resistance = 0.3;
        glass.tags = vec![Tag::NoDrop];
        r.register(glass);

        let mut obsidian = Material::block(id::OBSIDIAN, "obsidian");
        obsidian.blast_resistance = 1_200.0;
        r.register(obsidian);

        let mut stairs = Material::block(id::OAK_STAIRS, "oak_stairs");
        stairs.can_rotate = true;
        stairs.blast_resistance = 3.0;
        stairs.tags = vec![Tag::Stairs];
        r.register(stairs);

        // Inventory items

        let mut shovel = Material::item(id::WOODEN_SHOVEL, "wooden_shovel");
        shovel.instrument = Some(Instrument::Shovel);
        r.register(shovel);

        let mut hoe = Material::item(id::WOODEN_HOE, "wooden_hoe");
        hoe.instrument = Some(Instrument::Hoe);
        r.register(hoe);

        let mut igniter = Material::item(id::FLINT_AND_STEEL, "flint_and_steel");
        igniter.instrument = Some(Instrument::Igniter);
        r.register(igniter);

        r.register(Material::item(id::BUCKET, "bucket"));

        let mut water_bucket = Material::item(id::WATER_BUCKET, "water_bucket");
        water_bucket.places = Some(id::STILL_WATER);
        water_bucket.tags = vec![Tag::EmptiesToBucket];
        r.register(water_bucket);

        let mut egg = Material::item(id::CHICKEN_SPAWN_EGG, "chicken_spawn_egg");
        egg.spawn_egg = Some(("chicken", "base"));
        r.register(egg);

        let mut disc = Material::item(id::MUSIC_DISC, "music_disc");
        disc.tags = vec![Tag::Disc];
        r.register(disc);

        let mut seeds = Material::item(id::WHEAT_SEEDS, "wheat_seeds");
        seeds.places = Some(id::WHEAT);
        r.register(seeds);

        for (item_id, name) in [
            (id::SHEARS, "shears"),
            (id::WHITE_WOOL, "white_wool"),
            (id::FEATHER, "feather"),
            (id::MILK_BUCKET, "milk_bucket"),
            (id::EGG, "egg"),
            (id::WHEAT_ITEM, "wheat_item"),
        ] {
            r.register(Material::item(item_id, name));
        }

        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ids_are_inert() {
        let registry = BlockRegistry::standard();
        let unknown = registry.get(9_999);
        assert_eq!(unknown.name, "unknown");
        assert_eq!(unknown.drop, DropRule::Nothing);
        assert!(!registry.contains(9_999));
    }

    #[test]
    fn test_replace_rules() {
        let registry = BlockRegistry::standard();
        assert!(registry.can_replace(&BlockItem::AIR, id::STONE));
        assert!(registry.can_replace(&BlockItem::new(id::TALL_GRASS), id::STONE));
        assert!(registry.can_replace(&BlockItem::new(id::STILL_WATER), id::DIRT));
        assert!(!registry.can_replace(&BlockItem::new(id::STILL_WATER), id::STILL_WATER));
        assert!(!registry.can_replace(&BlockItem::new(id::STONE), id::DIRT));
    }

    #[test]
    fn test_door_parts_point_at_each_other() {
        let registry = BlockRegistry::standard();
        let bottom = registry.get(id::OAK_DOOR).next_part.unwrap();
        let top = registry.get(id::OAK_DOOR_TOP).previous_part.unwrap();
        assert_eq!(bottom.id, id::OAK_DOOR_TOP);
        assert_eq!(top.id, id::OAK_DOOR);
        assert_eq!(bottom.offset + top.offset, BlockPos::new(0, 0, 0));
    }

    #[test]
    fn test_solidity() {
        let registry = BlockRegistry::standard();
        assert!(registry.get(id::STONE).is_solid());
        assert!(!registry.get(id::AIR).is_solid());
        assert!(!registry.get(id::TORCH).is_solid());
        assert!(!registry.get(id::BUCKET).is_solid());
    }

    #[test]
    fn test_explosion_resistance_table() {
        let registry = BlockRegistry::standard();
        assert!(registry.get(id::STONE).blast_resistance <= 5.0);
        assert!(registry.get(id::OBSIDIAN).blast_resistance > 5.0);
        assert!(registry.get(id::BEDROCK).has_tag(Tag::Indestructible));
    }
}
