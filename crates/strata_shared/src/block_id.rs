//! Numeric block and item ids.
//!
//! Ids below 100 are placeable blocks, ids from 100 are items that only live
//! in inventories. The table is append-only: persisted worlds store these
//! numbers.

/// Empty space.
pub const AIR: u16 = 0;
/// Indestructible floor.
pub const BEDROCK: u16 = 1;
/// Stone.
pub const STONE: u16 = 2;
/// Dirt.
pub const DIRT: u16 = 3;
/// Grass-covered dirt.
pub const GRASS_BLOCK: u16 = 4;
/// Sand.
pub const SAND: u16 = 5;
/// Water source block.
pub const STILL_WATER: u16 = 6;
/// Flowing water.
pub const FLOWING_WATER: u16 = 7;
/// Oak log.
pub const OAK_LOG: u16 = 8;
/// Oak planks.
pub const OAK_PLANKS: u16 = 9;
/// Oak leaves.
pub const OAK_LEAVES: u16 = 10;
/// Tall grass plant.
pub const TALL_GRASS: u16 = 11;
/// Dandelion flower.
pub const DANDELION: u16 = 12;
/// Oak sapling.
pub const OAK_SAPLING: u16 = 13;
/// Flower pot.
pub const FLOWER_POT: u16 = 14;
/// Chest.
pub const CHEST: u16 = 15;
/// Furnace.
pub const FURNACE: u16 = 16;
/// Crafting table.
pub const CRAFTING_TABLE: u16 = 17;
/// Jukebox.
pub const JUKEBOX: u16 = 18;
/// TNT.
pub const TNT: u16 = 19;
/// Stone button.
pub const STONE_BUTTON: u16 = 20;
/// Lower half of an oak door.
pub const OAK_DOOR: u16 = 21;
/// Upper half of an oak door.
pub const OAK_DOOR_TOP: u16 = 22;
/// Bed; both halves share the id, the head carries `is_head`.
pub const RED_BED: u16 = 23;
/// Cake.
pub const CAKE: u16 = 24;
/// Torch.
pub const TORCH: u16 = 25;
/// Ladder.
pub const LADDER: u16 = 26;
/// Standing sign.
pub const OAK_SIGN: u16 = 27;
/// Snow layer.
pub const SNOW: u16 = 28;
/// Wheat crop.
pub const WHEAT: u16 = 29;
/// Farmland.
pub const FARMLAND: u16 = 30;
/// Dirt path.
pub const DIRT_PATH: u16 = 31;
/// Campfire.
pub const CAMPFIRE: u16 = 32;
/// Hanging chain.
pub const CHAIN: u16 = 33;
/// Lantern.
pub const LANTERN: u16 = 34;
/// Glass.
pub const GLASS: u16 = 35;
/// Obsidian.
pub const OBSIDIAN: u16 = 36;
/// Oak stairs.
pub const OAK_STAIRS: u16 = 37;

/// Wooden shovel.
pub const WOODEN_SHOVEL: u16 = 100;
/// Wooden hoe.
pub const WOODEN_HOE: u16 = 101;
/// Empty bucket.
pub const BUCKET: u16 = 102;
/// Bucket of water.
pub const WATER_BUCKET: u16 = 103;
/// Chicken spawn egg.
pub const CHICKEN_SPAWN_EGG: u16 = 104;
/// Music disc.
pub const MUSIC_DISC: u16 = 105;
/// Shears.
pub const SHEARS: u16 = 106;
/// Wheat seeds.
pub const WHEAT_SEEDS: u16 = 107;
/// White wool.
pub const WHITE_WOOL: u16 = 108;
/// Feather.
pub const FEATHER: u16 = 109;
/// Bucket of milk.
pub const MILK_BUCKET: u16 = 110;
/// Flint and steel.
pub const FLINT_AND_STEEL: u16 = 111;
/// Egg laid by chickens.
pub const EGG: u16 = 112;
/// Harvested wheat.
pub const WHEAT_ITEM: u16 = 113;

/// Sign id used by worlds created before the id table was compacted.
pub const LEGACY_SIGN: u16 = 141;
