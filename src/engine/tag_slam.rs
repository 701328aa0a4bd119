//! The tag-SLAM engine: gates, graph updates, optimization, outputs.
//!
//! All mutation happens on the host's single dispatch loop through
//! `handle_odometry`, `handle_detections`, and `bootstrap_tick`; the engine
//! never blocks after startup. Odometry samples pass the movement gate,
//! advance the pose prediction, and (when promoted to keyframes) feed the
//! factor graph and the optimizer. Non-keyframes only dead-reckon the
//! visualization estimate.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use crate::bootstrap::{InitDecision, PfBootstrap};
use crate::config::DrishtiConfig;
use crate::core::types::{OdometrySample, Point2D, Pose2D};
use crate::detect::{resolve_extrinsics, DetectionAggregator, TransformLookup};
use crate::error::Result;
use crate::graph::{
    Factor, FactorStore, IncrementalOptimizer, IncrementalParams, Key, LmOptimizer, NoiseModels,
    Value, Values,
};
use crate::io::{LandmarkTable, TrajectoryWriter};

use super::gates::{movement_exceeds, should_add_keyframe};
use super::loop_closure::LoopClosureDetector;
use super::pruner::prune_by_pose_count;

/// Static-transform lookup retry schedule at startup.
const TF_MAX_ATTEMPTS: u32 = 20;
const TF_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// A loop closure accepted this step, for visualization.
#[derive(Debug, Clone, Copy)]
pub struct LoopClosureEvent {
    /// Historical keyframe index.
    pub from_index: u64,
    /// Current keyframe index.
    pub to_index: u64,
}

/// Everything one odometry callback produces.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Sample survived the movement gate.
    pub accepted: bool,
    /// Sample was promoted to a keyframe.
    pub keyframe: bool,
    /// Pose index after this step.
    pub pose_index: u64,
    /// Latest visualization-estimate pose.
    pub refined_pose: Option<Pose2D>,
    /// Map-to-odom transform, `viz(X_i) ⊖ rawOdom`.
    pub map_to_odom: Option<Pose2D>,
    /// Ordered keyframe trajectory (index, pose).
    pub path: Vec<(u64, Pose2D)>,
    /// Landmark estimates, populated on keyframes.
    pub landmarks: Vec<(u32, Point2D)>,
    /// Loop closure added this step, if any.
    pub loop_closure: Option<LoopClosureEvent>,
}

/// Pose-graph localization and mapping engine.
pub struct TagSlam {
    config: DrishtiConfig,
    noise: NoiseModels,

    // Graph state. In batch mode `graph`/`estimates` are the full retained
    // problem; in incremental mode they stage factors and new variables
    // between solver updates.
    graph: FactorStore,
    estimates: Values,
    // Initial/prior values only, for residual gating. Never overwritten by
    // optimizer results.
    landmark_estimates: Values,
    incremental: Option<IncrementalOptimizer>,
    batch: LmOptimizer,

    aggregator: DetectionAggregator,
    bootstrap: Option<PfBootstrap>,
    prior_map: LandmarkTable,
    loop_detector: LoopClosureDetector,

    index_of_pose: u64,
    initialized: bool,
    pose0: Pose2D,
    // Odometry pose at the last accepted keyframe (movement gate anchor and
    // prediction baseline). None until the first sample arrives.
    last_pose_se2: Option<Pose2D>,
    last_pose_se2_vis: Pose2D,
    // Predicted pose of the newest keyframe.
    last_pose: Pose2D,
    // Last keyframe's predicted pose, baseline of the between factor.
    key_previous_pos: Pose2D,
    previous_keyframe: Option<Key>,
    // Last accepted optimized pose, for the outlier gate.
    last_pose_for_jump: Pose2D,

    historic: BTreeSet<Key>,
    pose_to_landmarks: BTreeMap<Key, BTreeSet<Key>>,
    prior_added: BTreeSet<Key>,

    viz_trail: BTreeMap<u64, Pose2D>,
    current_viz: Pose2D,

    raw_log: Option<TrajectoryWriter>,
    refined_log: Option<TrajectoryWriter>,
}

impl TagSlam {
    /// Build the engine: validate configuration, resolve camera extrinsics
    /// (bounded retries), load the prior landmark table, open CSV logs.
    ///
    /// Every failure here is fatal by design.
    pub fn new(config: DrishtiConfig, lookup: &dyn TransformLookup) -> Result<Self> {
        config.validate()?;

        let cameras = resolve_extrinsics(
            &config.cameras,
            &config.frames.robot_frame,
            lookup,
            TF_MAX_ATTEMPTS,
            TF_RETRY_INTERVAL,
        )?;
        let aggregator = DetectionAggregator::new(&cameras, config.landmarks.total_tags);

        let prior_map = match &config.landmarks.load_csv {
            Some(path) => LandmarkTable::load_csv(Path::new(path))?,
            None => LandmarkTable::new(),
        };
        if config.landmarks.use_prior_table && prior_map.is_empty() {
            log::warn!("prior-table mode is on but the landmark table is empty");
        }

        let incremental = if config.optimizer.use_isam2 {
            Some(IncrementalOptimizer::new(IncrementalParams {
                batch_seed: config.optimizer.batch_seed,
                ..Default::default()
            }))
        } else {
            None
        };
        let bootstrap = if config.bootstrap.enabled {
            Some(PfBootstrap::new(config.bootstrap.clone()))
        } else {
            None
        };

        let raw_log = match &config.persistence.raw_odom_csv {
            Some(path) => Some(TrajectoryWriter::create(Path::new(path))?),
            None => None,
        };
        let refined_log = match &config.persistence.refined_odom_csv {
            Some(path) => Some(TrajectoryWriter::create(Path::new(path))?),
            None => None,
        };

        let noise = config.noise_models.to_models();
        let loop_detector = LoopClosureDetector::new(config.loop_closure.clone());
        log::info!("parameters loaded, {} cameras", cameras.len());

        Ok(Self {
            config,
            noise,
            graph: FactorStore::new(),
            estimates: Values::new(),
            landmark_estimates: Values::new(),
            incremental,
            batch: LmOptimizer::default(),
            aggregator,
            bootstrap,
            prior_map,
            loop_detector,
            index_of_pose: 1,
            initialized: false,
            pose0: Pose2D::identity(),
            last_pose_se2: None,
            last_pose_se2_vis: Pose2D::identity(),
            last_pose: Pose2D::identity(),
            key_previous_pos: Pose2D::identity(),
            previous_keyframe: None,
            last_pose_for_jump: Pose2D::identity(),
            historic: BTreeSet::new(),
            pose_to_landmarks: BTreeMap::new(),
            prior_added: BTreeSet::new(),
            viz_trail: BTreeMap::new(),
            current_viz: Pose2D::identity(),
            raw_log,
            refined_log,
        })
    }

    /// Latest detection array from one camera.
    pub fn handle_detections(&mut self, camera: &str, detections: Vec<crate::detect::TagDetection>) {
        self.aggregator.ingest(camera, detections);
    }

    /// One bootstrap timer tick. Returns the accepted initial pose on the
    /// finalizing tick and installs it as pose0.
    pub fn bootstrap_tick(
        &mut self,
        now: f64,
        decision: &mut dyn InitDecision,
    ) -> Option<Pose2D> {
        let bootstrap = self.bootstrap.as_mut()?;
        if bootstrap.initialized() {
            return None;
        }
        let frame = self.aggregator.take_frame();
        let accepted = bootstrap.tick(now, &frame, &self.prior_map, decision);
        if let Some(pose) = accepted {
            self.pose0 = pose;
        }
        accepted
    }

    /// One odometry callback.
    pub fn handle_odometry(&mut self, sample: &OdometrySample) -> Result<StepOutput> {
        let mut output = self.process_odometry(sample)?;
        // Broadcast transform: viz(X_i) ⊖ rawOdom.
        if self.initialized {
            output.map_to_odom = Some(self.current_viz.compose(&sample.to_pose2().inverse()));
        }
        Ok(output)
    }

    fn process_odometry(&mut self, sample: &OdometrySample) -> Result<StepOutput> {
        let mut output = StepOutput {
            pose_index: self.index_of_pose,
            ..Default::default()
        };

        // Hold everything until the bootstrap has produced pose0.
        if let Some(bootstrap) = &self.bootstrap {
            if !bootstrap.initialized() {
                return Ok(output);
            }
        }

        let pose_se2 = sample.to_pose2();
        if let Some(writer) = &mut self.raw_log {
            writer.append(sample.stamp, &pose_se2)?;
        }

        // The first sample only anchors the gates.
        let anchor = match self.last_pose_se2 {
            Some(anchor) => anchor,
            None => {
                self.last_pose_se2 = Some(pose_se2);
                self.last_pose_se2_vis = pose_se2;
                return Ok(output);
            }
        };

        if !movement_exceeds(&anchor, &pose_se2, &self.config.stationary) {
            return Ok(output);
        }
        output.accepted = true;

        if !self.initialized {
            self.initialize_first_pose();
        }

        let odometry = anchor.between(&pose_se2);
        let predicted = self.last_pose.compose(&odometry);

        // Merge pending detections; in prior-map mode unknown ids are
        // skipped here, before gating and graph updates.
        let admitted: Vec<(u32, Point2D)> = self
            .aggregator
            .take_frame()
            .into_iter()
            .filter(|(id, _)| {
                if self.config.landmarks.use_prior_table && !self.prior_map.contains(*id) {
                    log::warn!("skipping unknown tag id {}", id);
                    false
                } else {
                    true
                }
            })
            .collect();
        let current_landmarks: BTreeSet<Key> =
            admitted.iter().map(|(id, _)| Key::Landmark(*id)).collect();
        let previous_landmarks = self
            .previous_keyframe
            .and_then(|key| self.pose_to_landmarks.get(&key).cloned())
            .unwrap_or_default();

        let is_keyframe = !self.config.keyframe.enabled
            || should_add_keyframe(
                &self.key_previous_pos,
                &predicted,
                &previous_landmarks,
                &current_landmarks,
                &self.config.keyframe,
            );

        if is_keyframe {
            self.index_of_pose += 1;
            output.pose_index = self.index_of_pose;
            output.keyframe = true;
            let current_key = Key::Pose(self.index_of_pose);

            self.estimates.insert(current_key, Value::Pose(predicted));
            self.landmark_estimates
                .insert(current_key, Value::Pose(predicted));
            if let Some(previous) = self.previous_keyframe {
                self.graph.add(Factor::Between {
                    from: previous,
                    to: current_key,
                    delta: self.key_previous_pos.between(&predicted),
                    noise: self.noise.odometry.clone(),
                });
            }
            self.last_pose = predicted;

            let observed = self.update_graph_with_landmarks(current_key, &predicted, &admitted);
            self.pose_to_landmarks.insert(current_key, observed.clone());

            self.optimize_current(current_key, &anchor, &pose_se2);

            self.last_pose_se2 = Some(pose_se2);
            self.key_previous_pos = predicted;
            self.previous_keyframe = Some(current_key);

            if self.loop_detector.enabled() {
                let proposal = {
                    let source = self.active_estimates();
                    source.pose(&current_key).and_then(|current_pose| {
                        self.loop_detector.detect(
                            self.index_of_pose,
                            &current_pose,
                            &self.last_pose,
                            &observed,
                            &self.pose_to_landmarks,
                            source,
                        )
                    })
                };
                if let Some(proposal) = proposal {
                    output.loop_closure = Some(LoopClosureEvent {
                        from_index: proposal.from.pose_index().unwrap_or(0),
                        to_index: self.index_of_pose,
                    });
                    self.graph.add(Factor::LoopClosure {
                        from: proposal.from,
                        to: proposal.to,
                        delta: proposal.delta,
                        noise: self.noise.loop_closure.clone(),
                    });
                }
            }

            let optimized = self
                .active_estimates()
                .pose(&current_key)
                .unwrap_or(predicted);
            self.viz_trail.insert(self.index_of_pose, optimized);
            self.current_viz = optimized;
            self.last_pose_se2_vis = pose_se2;
            output.landmarks = self.active_estimates().landmarks();
        } else {
            // Visualization-only dead reckoning.
            let delta = self.last_pose_se2_vis.between(&pose_se2);
            self.current_viz = self.current_viz.compose(&delta);
            self.last_pose_se2_vis = pose_se2;
        }

        if self.config.smoothing.enabled
            && !self.config.keyframe.enabled
            && self.index_of_pose >= self.config.smoothing.start_index
        {
            self.smooth_trail();
        }

        output.refined_pose = Some(self.current_viz);
        if let Some(writer) = &mut self.refined_log {
            writer.append(sample.stamp, &self.current_viz)?;
        }
        output.path = self.viz_trail.iter().map(|(i, p)| (*i, *p)).collect();
        Ok(output)
    }

    /// Write the mapped tag locations if saving is configured.
    pub fn save_landmarks(&self) -> Result<()> {
        if !self.config.landmarks.save_tag_locations {
            return Ok(());
        }
        let Some(path) = &self.config.landmarks.save_csv else {
            return Ok(());
        };
        let landmarks = self.active_estimates().landmarks();
        LandmarkTable::save_csv(Path::new(path), landmarks.iter().map(|(id, p)| (*id, p)))
    }

    /// Current estimate store (the incremental solver's in incremental
    /// mode, the retained batch values otherwise).
    pub fn estimates(&self) -> &Values {
        self.active_estimates()
    }

    /// The live factor graph (cumulative in both modes).
    pub fn factor_graph(&self) -> &FactorStore {
        match &self.incremental {
            Some(solver) => solver.graph(),
            None => &self.graph,
        }
    }

    /// Current pose index.
    pub fn pose_index(&self) -> u64 {
        self.index_of_pose
    }

    /// Whether the first pose has been created.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The configuration this engine runs with.
    pub fn config(&self) -> &DrishtiConfig {
        &self.config
    }

    fn active_estimates(&self) -> &Values {
        match &self.incremental {
            Some(solver) => solver.estimate(),
            None => &self.estimates,
        }
    }

    /// Create X1 at pose0 with its prior; in prior-table mode, seed every
    /// calibrated landmark with its point prior.
    fn initialize_first_pose(&mut self) {
        self.initialized = true;
        let pose0 = self.pose0;

        self.graph.add(Factor::PriorPose {
            key: Key::Pose(1),
            prior: pose0,
            noise: self.noise.prior.clone(),
        });
        self.prior_added.insert(Key::Pose(1));
        self.estimates.insert(Key::Pose(1), Value::Pose(pose0));
        self.landmark_estimates.insert(Key::Pose(1), Value::Pose(pose0));
        self.viz_trail.insert(1, pose0);
        self.current_viz = pose0;
        self.last_pose = pose0;
        self.last_pose_for_jump = pose0;
        self.key_previous_pos = pose0;
        self.previous_keyframe = Some(Key::Pose(1));
        self.pose_to_landmarks.insert(Key::Pose(1), BTreeSet::new());

        if self.config.landmarks.use_prior_table {
            for (id, point) in self.prior_map.iter() {
                let key = Key::Landmark(id);
                self.graph.add(Factor::PriorPoint {
                    key,
                    prior: *point,
                    noise: self.noise.point.clone(),
                });
                self.estimates.insert(key, Value::Point(*point));
                self.landmark_estimates.insert(key, Value::Point(*point));
            }
        }
        log::info!("first pose initialized at ({:.3}, {:.3})", pose0.x, pose0.y);
    }

    /// Attach this keyframe's detections: bearing-range factors with
    /// residual gating for known landmarks, provisional estimate + prior
    /// for first observations.
    fn update_graph_with_landmarks(
        &mut self,
        current_key: Key,
        predicted: &Pose2D,
        admitted: &[(u32, Point2D)],
    ) -> BTreeSet<Key> {
        let mut observed = BTreeSet::new();
        for (id, position) in admitted {
            let bearing = position.bearing();
            let range = position.norm();
            let landmark_key = Key::Landmark(*id);

            if self.historic.contains(&landmark_key) {
                let factor = Factor::BearingRange {
                    pose: current_key,
                    landmark: landmark_key,
                    bearing,
                    range,
                    noise: self.noise.bearing_range.clone(),
                };
                match factor.unwhitened_error(&self.landmark_estimates) {
                    Some(error)
                        if error[0].abs()
                            < self.config.optimizer.add_to_graph_threshold as f64 =>
                    {
                        self.graph.add(factor);
                    }
                    Some(error) => {
                        log::debug!(
                            "observation of {} dropped, bearing residual {:.3}",
                            landmark_key,
                            error[0]
                        );
                    }
                    None => {
                        log::warn!("no estimate to gate observation of {}", landmark_key);
                    }
                }
                observed.insert(landmark_key);
            } else {
                self.historic.insert(landmark_key);
                let provisional = predicted.transform_point(position);

                if !self.landmark_estimates.contains(&landmark_key)
                    || !self.config.landmarks.use_prior_table
                {
                    if !self.estimates.contains(&landmark_key) {
                        self.estimates
                            .insert(landmark_key, Value::Point(provisional));
                    }
                    if !self.landmark_estimates.contains(&landmark_key) {
                        self.landmark_estimates
                            .insert(landmark_key, Value::Point(provisional));
                    }
                    self.graph.add(Factor::PriorPoint {
                        key: landmark_key,
                        prior: provisional,
                        noise: self.noise.point.clone(),
                    });
                }
                self.graph.add(Factor::BearingRange {
                    pose: current_key,
                    landmark: landmark_key,
                    bearing,
                    range,
                    noise: self.noise.bearing_range.clone(),
                });
                observed.insert(landmark_key);
            }
        }
        observed
    }

    /// Run the configured optimizer for the current keyframe; in batch mode
    /// apply the outlier gate and pruning.
    fn optimize_current(&mut self, current_key: Key, anchor: &Pose2D, pose_se2: &Pose2D) {
        if let Some(solver) = &mut self.incremental {
            let staged_factors = self.graph.drain();
            let staged_values = std::mem::take(&mut self.estimates);
            solver.update(staged_factors, &staged_values);
            self.last_pose_for_jump = solver
                .estimate()
                .pose(&current_key)
                .unwrap_or(self.last_pose);
            return;
        }

        let (result, report) = self.batch.optimize(&self.graph, &self.estimates);
        if !report.converged {
            log::debug!(
                "batch solve stopped without convergence ({:?}), keeping iterate",
                report.reason
            );
        }
        let new_pose = result.pose(&current_key).unwrap_or(self.last_pose);

        if self.index_of_pose < self.config.outlier.start_index {
            self.estimates = result;
        } else {
            let jump = lateral_jump(&self.last_pose_for_jump, &new_pose);
            if jump > self.config.outlier.jump_threshold && self.config.outlier.enabled {
                log::warn!(
                    "large lateral jump {:.3}, discarding solve for X{}",
                    jump,
                    self.index_of_pose
                );
                let fallback = self.last_pose_for_jump.compose(&anchor.between(pose_se2));
                self.estimates.update(current_key, Value::Pose(fallback));
            } else {
                self.estimates = result;
                if self.config.pruning.enabled {
                    prune_by_pose_count(
                        &mut self.graph,
                        &mut self.estimates,
                        &mut self.pose_to_landmarks,
                        &mut self.prior_added,
                        self.config.pruning.max_poses,
                        &self.noise.prior,
                    );
                }
            }
        }
        self.last_pose_for_jump = self
            .estimates
            .pose(&current_key)
            .unwrap_or(self.last_pose);
    }

    /// Moving-average smoothing of the newest trajectory pose.
    fn smooth_trail(&mut self) {
        let window = self.config.smoothing.window;
        if self.viz_trail.len() < window {
            return;
        }
        let tail: Vec<(u64, Pose2D)> = self
            .viz_trail
            .iter()
            .rev()
            .take(window)
            .map(|(i, p)| (*i, *p))
            .collect();
        let avg_x: f32 = tail.iter().map(|(_, p)| p.x).sum::<f32>() / window as f32;
        let avg_y: f32 = tail.iter().map(|(_, p)| p.y).sum::<f32>() / window as f32;
        let (last_index, last_pose) = tail[0];
        let smoothed = Pose2D::new(avg_x, avg_y, last_pose.theta);
        self.viz_trail.insert(last_index, smoothed);
        if last_index == self.index_of_pose {
            self.current_viz = smoothed;
        }
    }
}

/// Magnitude of the displacement projected perpendicular to the old heading.
fn lateral_jump(old: &Pose2D, new: &Pose2D) -> f32 {
    let dx = new.x - old.x;
    let dy = new.y - old.y;
    (dx * (-old.theta.sin()) + dy * old.theta.cos()).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_lateral_jump_perpendicular_only() {
        // Heading +x: jumps along y are lateral, along x are not.
        let old = Pose2D::new(1.0, 1.0, 0.0);
        assert_relative_eq!(lateral_jump(&old, &Pose2D::new(2.0, 1.0, 0.0)), 0.0);
        assert_relative_eq!(lateral_jump(&old, &Pose2D::new(1.0, 1.5, 0.0)), 0.5);
    }

    #[test]
    fn test_lateral_jump_rotated_heading() {
        // Heading +y: jumps along x are lateral.
        let old = Pose2D::new(0.0, 0.0, FRAC_PI_2);
        assert_relative_eq!(
            lateral_jump(&old, &Pose2D::new(0.4, 0.0, FRAC_PI_2)),
            0.4,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            lateral_jump(&old, &Pose2D::new(0.0, 2.0, FRAC_PI_2)),
            0.0,
            epsilon = 1e-6
        );
    }
}
