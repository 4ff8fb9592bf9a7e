#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::HashMap;

use crate::config::Colour;
use crate::error::ProtocolError;
use crate::geometry::{self, HitCandidate, ScreenPoint, ViewState, WorldCoord};
use crate::protocol::{DisplayObject, SelectedObject};

/// Latest known state of one keyed object.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedObject {
    pub key: String,
    pub coord: WorldCoord,
    pub rotation: f64,
    pub label: Option<String>,
    pub colour: Option<Colour>,
    pub hidden: bool,
    /// Bumped on every `Position`; drives hit-test tie breaking.
    pub sequence: u64,
}

/// Whether an applied command changed anything visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Unchanged,
}

#[derive(Debug, Default)]
struct Layer {
    name: String,
    objects: Vec<PlacedObject>,
    /// key -> slot in `objects`
    slots: HashMap<String, usize>,
}

impl Layer {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut PlacedObject> {
        let slot = *self.slots.get(key)?;
        self.objects.get_mut(slot)
    }

    fn remove(&mut self, key: &str) -> bool {
        let Some(slot) = self.slots.remove(key) else {
            return false;
        };
        self.objects.remove(slot);
        for shifted in &self.objects[slot..] {
            if let Some(index) = self.slots.get_mut(&shifted.key) {
                *index -= 1;
            }
        }
        true
    }
}

/// Layered key -> object mapping.
///
/// Keys are unique within a layer; the same key may name separate objects on
/// different layers. `RemoveObject` and `HideObject` address a key on every
/// layer. Layers are drawn in the order they were first seen and keep their
/// slot even when emptied.
#[derive(Debug, Default)]
pub struct ObjectStore {
    layers: Vec<Layer>,
    /// layer name -> position in `layers`
    index: HashMap<String, usize>,
    sequence: u64,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, command: DisplayObject) -> Result<Applied, ProtocolError> {
        match command {
            DisplayObject::Position {
                key,
                layer,
                coord,
                rotation,
                label,
                colour,
            } => {
                if key.is_empty() {
                    return Err(ProtocolError::EmptyKey);
                }
                if layer.is_empty() {
                    return Err(ProtocolError::EmptyLayer { key });
                }
                if !coord.is_finite() || !rotation.is_finite() {
                    return Err(ProtocolError::NonFinite { key });
                }
                self.sequence += 1;
                let placed = PlacedObject {
                    key,
                    coord,
                    rotation,
                    label,
                    colour,
                    hidden: false,
                    sequence: self.sequence,
                };
                self.upsert(&layer, placed);
                Ok(Applied::Changed)
            }
            DisplayObject::RemoveObject { key } => {
                if key.is_empty() {
                    return Err(ProtocolError::EmptyKey);
                }
                Ok(self.remove(&key))
            }
            DisplayObject::HideObject { key, hidden } => {
                if key.is_empty() {
                    return Err(ProtocolError::EmptyKey);
                }
                let mut applied = Applied::Unchanged;
                for layer in &mut self.layers {
                    match layer.get_mut(&key) {
                        Some(object) if object.hidden != hidden => {
                            object.hidden = hidden;
                            applied = Applied::Changed;
                        }
                        _ => {}
                    }
                }
                Ok(applied)
            }
            other @ (DisplayObject::PolarGrid {}
            | DisplayObject::Icon { .. }
            | DisplayObject::Heading { .. }
            | DisplayObject::LayoutUpdate { .. }) => Err(ProtocolError::NotStorable(other.kind())),
        }
    }

    /// Visible and hidden objects in draw order: layer insertion order, then
    /// object insertion order within the layer.
    pub fn snapshot(&self) -> Vec<(&str, &PlacedObject)> {
        self.layers
            .iter()
            .flat_map(|layer| layer.objects.iter().map(move |o| (layer.name.as_str(), o)))
            .collect()
    }

    pub fn get(&self, layer: &str, key: &str) -> Option<&PlacedObject> {
        let layer = &self.layers[*self.index.get(layer)?];
        layer.objects.get(*layer.slots.get(key)?)
    }

    /// Number of objects across all layers.
    pub fn len(&self) -> usize {
        self.layers.iter().map(|l| l.objects.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.objects.is_empty())
    }

    /// Visible objects under `click`, most recently updated first.
    pub fn pick(&self, click: ScreenPoint, view: &ViewState, pick_radius: f64) -> Vec<SelectedObject> {
        let candidates = self
            .snapshot()
            .into_iter()
            .filter(|(_, o)| !o.hidden)
            .map(|(layer, o)| HitCandidate {
                key: &o.key,
                layer,
                coord: o.coord,
                sequence: o.sequence,
            });
        geometry::hit_test(click, candidates, view, pick_radius)
    }

    fn upsert(&mut self, layer_name: &str, mut placed: PlacedObject) {
        let target = match self.index.get(layer_name) {
            Some(&i) => i,
            None => {
                self.layers.push(Layer::new(layer_name));
                self.index.insert(layer_name.to_string(), self.layers.len() - 1);
                self.layers.len() - 1
            }
        };
        let layer = &mut self.layers[target];
        match layer.get_mut(&placed.key) {
            Some(current) => {
                placed.hidden = current.hidden;
                *current = placed;
            }
            None => {
                layer.slots.insert(placed.key.clone(), layer.objects.len());
                layer.objects.push(placed);
            }
        }
    }

    fn remove(&mut self, key: &str) -> Applied {
        let mut removed = false;
        for layer in &mut self.layers {
            removed |= layer.remove(key);
        }
        if removed {
            Applied::Changed
        } else {
            Applied::Unchanged
        }
    }
}
