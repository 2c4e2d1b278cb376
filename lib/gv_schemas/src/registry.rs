//! The block-type registry: the 8-bit voxel identifier space and the render/simulation
//! attributes each registered block type carries.

use std::fmt::{Display, Formatter};

use bytemuck::{Pod, Zeroable};
use hashbrown::HashMap;
use kstring::KString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default namespace for built-in block types.
pub const GV_REGISTRY_DOMAIN: &str = "gv";

/// A namespaced block type name (`namespace:key`), stable across client and server builds.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct RegistryName {
    /// The namespace.
    pub ns: KString,
    /// The key, unique within the namespace.
    pub key: KString,
}

impl RegistryName {
    /// Constructs a `gv:`-namespaced name.
    pub fn gv(key: &str) -> Self {
        Self {
            ns: KString::from_static(GV_REGISTRY_DOMAIN),
            key: KString::from_ref(key),
        }
    }

    /// Constructs a name out of the given namespace and key.
    pub fn new(ns: &str, key: &str) -> Self {
        Self {
            ns: KString::from_ref(ns),
            key: KString::from_ref(key),
        }
    }
}

impl Display for RegistryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ns, self.key)
    }
}

/// An 8-bit voxel identifier. `0` is air; every other value indexes [`BlockRegistry`].
#[derive(Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Serialize, Deserialize, Zeroable, Pod)]
#[repr(transparent)]
pub struct BlockId(pub u8);

impl BlockId {
    /// The reserved identifier for "no block".
    pub const AIR: BlockId = BlockId(0);

    /// Whether this is the reserved air identifier.
    pub fn is_air(self) -> bool {
        self == Self::AIR
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

/// How a block type is drawn. The mesh pipeline only emits outward-face quads for
/// [`RenderClass::VoxelCube`]; the other two are handled by the instancing/fluid subsystems.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RenderClass {
    /// A standard full cube contributing to the chunk's quad index.
    VoxelCube,
    /// Rendered as a per-block model instance (e.g. foliage); never contributes quads.
    InstancedMesh,
    /// Transparent and fluid-bearing (water). Contributes no solid quads and never blocks
    /// connectivity or physics as a solid voxel.
    TransparentFluid,
}

/// Render and simulation attributes of a registered block type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    /// The stable, namespaced identifier, unaffected by registry reordering.
    pub name: RegistryName,
    /// How the block is rendered.
    pub render_class: RenderClass,
    /// Hits required from [`crate::wire`] damage accumulation before the block breaks. `0` means
    /// the block breaks on first hit.
    pub durability: u8,
}

impl BlockDefinition {
    /// Whether this block type participates in connectivity/physics as a solid, opaque voxel.
    pub fn is_solid(&self) -> bool {
        !matches!(self.render_class, RenderClass::TransparentFluid)
    }
}

/// Errors from [`BlockRegistry`] registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has no more free 8-bit identifiers (255 non-air slots are already taken).
    #[error("block registry is full, no free identifiers remain")]
    Full,
    /// A block type with this name is already registered.
    #[error("block type {name} is already registered")]
    NameAlreadyExists {
        /// The conflicting name.
        name: RegistryName,
    },
}

/// A registry of up to 255 block types (identifiers `1..=255`; `0` is always air).
#[derive(Default)]
pub struct BlockRegistry {
    by_id: Vec<Option<BlockDefinition>>,
    by_name: HashMap<RegistryName, BlockId>,
    water_id: Option<BlockId>,
}

impl BlockRegistry {
    /// Constructs an empty registry with only the reserved air slot populated.
    pub fn new() -> Self {
        Self {
            by_id: vec![Some(BlockDefinition {
                name: RegistryName::gv("air"),
                render_class: RenderClass::InstancedMesh,
                durability: 0,
            })],
            by_name: HashMap::new(),
            water_id: None,
        }
    }

    /// Registers a new block type, allocating the next free identifier.
    pub fn register(&mut self, def: BlockDefinition) -> Result<BlockId, RegistryError> {
        if self.by_name.contains_key(&def.name) {
            return Err(RegistryError::NameAlreadyExists { name: def.name });
        }
        let next_id = self.by_id.len();
        if next_id > u8::MAX as usize {
            return Err(RegistryError::Full);
        }
        let id = BlockId(next_id as u8);
        let is_water = def.name == RegistryName::gv("water");
        self.by_name.insert(def.name.clone(), id);
        self.by_id.push(Some(def));
        if is_water {
            self.water_id = Some(id);
        }
        Ok(id)
    }

    /// Looks up a block type by identifier.
    pub fn get(&self, id: BlockId) -> Option<&BlockDefinition> {
        self.by_id.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Looks up a block's identifier by its stable name.
    pub fn id_of(&self, name: &RegistryName) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// The distinguished water identifier used by the fluid system, if `gv:water` is registered.
    pub fn water_id(&self) -> Option<BlockId> {
        self.water_id
    }

    /// Whether `id` refers to a solid, opaque voxel (air and fluids are never solid).
    pub fn is_solid(&self, id: BlockId) -> bool {
        if id.is_air() {
            return false;
        }
        self.get(id).is_some_and(BlockDefinition::is_solid)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stone() -> BlockDefinition {
        BlockDefinition {
            name: RegistryName::gv("stone"),
            render_class: RenderClass::VoxelCube,
            durability: 5,
        }
    }

    fn water() -> BlockDefinition {
        BlockDefinition {
            name: RegistryName::gv("water"),
            render_class: RenderClass::TransparentFluid,
            durability: 0,
        }
    }

    #[test]
    fn air_is_implicit_and_never_solid() {
        let reg = BlockRegistry::new();
        assert!(!reg.is_solid(BlockId::AIR));
        assert_eq!(reg.get(BlockId::AIR).unwrap().name, RegistryName::gv("air"));
    }

    #[test]
    fn registers_and_looks_up_by_name_and_id() {
        let mut reg = BlockRegistry::new();
        let id = reg.register(stone()).unwrap();
        assert_eq!(reg.id_of(&RegistryName::gv("stone")), Some(id));
        assert!(reg.is_solid(id));
    }

    #[test]
    fn water_is_tracked_and_not_solid() {
        let mut reg = BlockRegistry::new();
        let id = reg.register(water()).unwrap();
        assert_eq!(reg.water_id(), Some(id));
        assert!(!reg.is_solid(id));
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut reg = BlockRegistry::new();
        reg.register(stone()).unwrap();
        assert!(matches!(reg.register(stone()), Err(RegistryError::NameAlreadyExists { .. })));
    }
}
