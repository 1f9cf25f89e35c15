// scene.rs — the in-memory level handed to the baker

use qlight_common::bspworld::BspWorld;
use qlight_common::entities::Entity;
use qlight_common::q_shared::{EntityTransform, Vec3};
use qlight_common::qfiles::{DrawSurface, DrawVert, MAX_MAP_DRAW_INDEXES, MAX_MAP_DRAW_SURFS, MAX_MAP_DRAW_VERTS, MAX_MAP_MODELS};

use crate::error::LightError;
use crate::shader::ShaderInfo;

/// A contiguous run of draw surfaces. Model 0 is the world.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BspModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_surface: usize,
    pub num_surfaces: usize,
}

pub struct Scene {
    pub world: BspWorld,
    pub entities: Vec<Entity>,
    pub models: Vec<BspModel>,
    pub shaders: Vec<ShaderInfo>,
    pub surfaces: Vec<DrawSurface>,
    pub verts: Vec<DrawVert>,
    pub indexes: Vec<u32>,
}

impl Scene {
    pub fn new(world: BspWorld) -> Self {
        Self {
            world,
            entities: Vec::new(),
            models: Vec::new(),
            shaders: Vec::new(),
            surfaces: Vec::new(),
            verts: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Check every index range before any phase trusts them.
    pub fn validate(&self) -> Result<(), LightError> {
        if self.surfaces.len() > MAX_MAP_DRAW_SURFS {
            return Err(LightError::capacity("MAX_MAP_DRAW_SURFS", MAX_MAP_DRAW_SURFS));
        }
        if self.verts.len() > MAX_MAP_DRAW_VERTS {
            return Err(LightError::capacity("MAX_MAP_DRAW_VERTS", MAX_MAP_DRAW_VERTS));
        }
        if self.indexes.len() > MAX_MAP_DRAW_INDEXES {
            return Err(LightError::capacity("MAX_MAP_DRAW_INDEXES", MAX_MAP_DRAW_INDEXES));
        }
        if self.models.len() > MAX_MAP_MODELS {
            return Err(LightError::capacity("MAX_MAP_MODELS", MAX_MAP_MODELS));
        }
        for (num, surf) in self.surfaces.iter().enumerate() {
            if surf.shader_num >= self.shaders.len() {
                return Err(LightError::InvalidInput(format!(
                    "surface {} references shader {} of {}",
                    num,
                    surf.shader_num,
                    self.shaders.len()
                )));
            }
            if surf.first_vert + surf.num_verts > self.verts.len()
                || surf.first_index + surf.num_indexes > self.indexes.len()
            {
                return Err(LightError::InvalidInput(format!("surface {} out of range", num)));
            }
            let bad_index = self.surface_indexes(surf).iter().any(|&i| i as usize >= surf.num_verts);
            if bad_index {
                return Err(LightError::InvalidInput(format!("surface {} has a bad index", num)));
            }
        }
        for (num, model) in self.models.iter().enumerate() {
            if model.first_surface + model.num_surfaces > self.surfaces.len() {
                return Err(LightError::InvalidInput(format!("model {} out of range", num)));
            }
        }
        Ok(())
    }

    pub fn surface_verts(&self, surf: &DrawSurface) -> &[DrawVert] {
        &self.verts[surf.first_vert..surf.first_vert + surf.num_verts]
    }

    pub fn surface_indexes(&self, surf: &DrawSurface) -> &[u32] {
        &self.indexes[surf.first_index..surf.first_index + surf.num_indexes]
    }

    pub fn shader(&self, surf: &DrawSurface) -> &ShaderInfo {
        &self.shaders[surf.shader_num]
    }

    pub fn worldspawn(&self) -> Option<&Entity> {
        self.entities.first()
    }

    /// Model number for a `"model" "*N"` key.
    pub fn entity_model(ent: &Entity) -> Option<usize> {
        let value = ent.value_for_key("model");
        value.strip_prefix('*')?.parse::<usize>().ok()
    }

    /// Placement of a brush entity: origin, angles or angle, modelscale.
    pub fn entity_transform(ent: &Entity) -> EntityTransform {
        let origin = ent.vector_for_key("origin");
        let mut scale = [1.0; 3];
        if ent.has_key("modelscale_vec") {
            scale = ent.vector_for_key("modelscale_vec");
        } else if ent.has_key("modelscale") {
            let s = ent.float_for_key("modelscale");
            scale = [s; 3];
        }
        for s in scale.iter_mut() {
            if *s == 0.0 {
                *s = 1.0;
            }
        }
        let angles = if ent.has_key("angles") {
            ent.vector_for_key("angles")
        } else {
            [0.0, ent.float_for_key("angle"), 0.0]
        };
        EntityTransform::new(origin, angles, scale)
    }

    /// Placement of the entity that owns `surf`; identity for the world.
    pub fn surface_transform(&self, surf: &DrawSurface) -> EntityTransform {
        if surf.entity_num == 0 {
            return EntityTransform::default();
        }
        self.entities
            .get(surf.entity_num)
            .filter(|e| Scene::entity_model(e).is_some())
            .map(Scene::entity_transform)
            .unwrap_or_default()
    }

    /// Find an entity by its `targetname`.
    pub fn find_target(&self, target: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.value_for_key("targetname") == target)
    }
}
