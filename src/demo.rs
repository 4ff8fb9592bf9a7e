//! Synthetic sensor returns for running the viewer without a vehicle.

use rand::Rng;

use crate::config::Colour;
use crate::geometry::{normalise_degrees, WorldCoord};
use crate::protocol::DisplayObject;

pub const DEMO_LAYER: &str = "demo";

const LERP_FACTOR: f64 = 0.1;
/// Chance per step that a return picks a new place to drift towards.
const RETARGET_CHANCE: f64 = 0.02;
const HEADING_STEP_DEG: f64 = 2.0;

struct DriftingReturn {
    key: String,
    position: WorldCoord,
    target: WorldCoord,
}

/// Returns that wander smoothly around the vehicle while it slowly turns.
pub struct DemoFeed<R: Rng> {
    returns: Vec<DriftingReturn>,
    heading: f64,
    max_range: f64,
    rng: R,
}

impl<R: Rng> DemoFeed<R> {
    pub fn new(count: usize, max_range: f64, mut rng: R) -> Self {
        let max_range = if max_range.is_finite() && max_range > 0.0 {
            max_range
        } else {
            1.0
        };
        let returns = (0..count)
            .map(|i| {
                let position = random_coord(&mut rng, max_range);
                DriftingReturn {
                    key: format!("return-{i}"),
                    position,
                    target: random_coord(&mut rng, max_range),
                }
            })
            .collect();
        Self {
            returns,
            heading: 0.0,
            max_range,
            rng,
        }
    }

    /// Advance one step and produce the commands describing it.
    pub fn step(&mut self) -> Vec<DisplayObject> {
        self.heading = normalise_degrees(self.heading + HEADING_STEP_DEG);
        let mut commands = Vec::with_capacity(self.returns.len() + 1);
        commands.push(DisplayObject::Heading {
            degrees: self.heading,
        });

        for ret in &mut self.returns {
            if self.rng.random_bool(RETARGET_CHANCE) {
                ret.target = random_coord(&mut self.rng, self.max_range);
            }
            ret.position = WorldCoord::new(
                lerp(ret.position.north, ret.target.north),
                lerp(ret.position.east, ret.target.east),
            );
            let range = ret.position.range();
            let colour = if range < self.max_range * 0.25 {
                Colour::RED
            } else {
                Colour::YELLOW
            };
            commands.push(DisplayObject::Position {
                key: ret.key.clone(),
                layer: DEMO_LAYER.to_string(),
                coord: ret.position,
                rotation: ret.position.bearing(),
                label: Some(ret.key.clone()),
                colour: Some(colour),
            });
        }
        commands
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }
}

fn random_coord<R: Rng>(rng: &mut R, max_range: f64) -> WorldCoord {
    WorldCoord::from_range_bearing(
        rng.random_range(0.1 * max_range..max_range),
        rng.random_range(0.0..360.0),
    )
}

fn lerp(current: f64, target: f64) -> f64 {
    current + (target - current) * LERP_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_step_reports_heading_and_all_returns() {
        let mut feed = DemoFeed::new(3, 10.0, StdRng::seed_from_u64(7));
        let commands = feed.step();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0], DisplayObject::Heading { degrees: 2.0 });
        for command in &commands[1..] {
            let DisplayObject::Position { layer, coord, .. } = command else {
                panic!("expected a position, got {command:?}");
            };
            assert_eq!(layer, DEMO_LAYER);
            assert!(coord.range() <= 10.0 + 1e-9);
        }
    }

    #[test]
    fn heading_wraps() {
        let mut feed = DemoFeed::new(0, 10.0, StdRng::seed_from_u64(1));
        for _ in 0..180 {
            feed.step();
        }
        assert!(feed.heading().abs() < 1e-9);
    }
}
