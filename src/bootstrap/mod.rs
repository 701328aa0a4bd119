//! Particle-filter bootstrap for the initial pose.
//!
//! When no reliable external prior exists but a prior landmark table does,
//! the bootstrap estimates the robot's starting position from its first tag
//! observations. Particles are back-projected from the first valid
//! detection, reweighted against subsequent detections with Gaussian
//! bearing/range likelihoods, and resampled; after the collection window a
//! human-confirmation port accepts or rejects the particle mean.
//!
//! The accepted pose's orientation is pinned to 0: the filter resolves
//! position, orientation is taken as "the robot currently faces body-x".

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::config::BootstrapSection;
use crate::core::math::normalize_angle;
use crate::core::types::{Point2D, Pose2D};
use crate::io::LandmarkTable;

/// Bootstrap state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Waiting for a first valid detection.
    Idle,
    /// Accumulating particle updates during the collection window.
    Collecting,
    /// Candidate computed, waiting on the confirmation port.
    AwaitConfirm,
    /// Pose accepted; terminal.
    Initialized,
}

/// Injected yes/no decision port for the candidate pose.
pub trait InitDecision {
    /// Accept (`true`) or reject (`false`) the candidate initial pose.
    fn confirm(&mut self, candidate: &Pose2D) -> bool;
}

/// Particle-filter initial-pose estimator.
#[derive(Debug)]
pub struct PfBootstrap {
    config: BootstrapSection,
    particles: Vec<Pose2D>,
    phase: BootstrapPhase,
    started_at: f64,
    rng: StdRng,
    result: Option<Pose2D>,
}

impl PfBootstrap {
    /// Create an idle bootstrap.
    pub fn new(config: BootstrapSection) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Self {
            config,
            particles: Vec::new(),
            phase: BootstrapPhase::Idle,
            started_at: 0.0,
            rng,
            result: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    /// Whether a pose has been accepted.
    pub fn initialized(&self) -> bool {
        self.phase == BootstrapPhase::Initialized
    }

    /// The accepted pose, once initialized.
    pub fn result(&self) -> Option<Pose2D> {
        self.result
    }

    /// One timer tick with the detections pending at `now` (seconds).
    ///
    /// Returns the accepted initial pose on the tick that finalizes the
    /// procedure. Detections whose id is not in the prior table are
    /// skipped; with no valid detection the bootstrap idles.
    pub fn tick(
        &mut self,
        now: f64,
        detections: &[(u32, Point2D)],
        prior: &LandmarkTable,
        decision: &mut dyn InitDecision,
    ) -> Option<Pose2D> {
        if self.phase == BootstrapPhase::Initialized {
            return None;
        }

        let valid: Vec<(Point2D, Point2D)> = detections
            .iter()
            .filter_map(|(id, position)| match prior.get(*id) {
                Some(world) => Some((*position, *world)),
                None => {
                    log::warn!("skipping unknown tag id {} during bootstrap", id);
                    None
                }
            })
            .collect();

        if valid.is_empty() {
            log::debug!("no valid tags detected, waiting for detections");
            return None;
        }

        if self.phase == BootstrapPhase::Idle {
            self.phase = BootstrapPhase::Collecting;
            self.started_at = now;
            self.init_particles(&valid[0]);
            log::info!("bootstrap started with {} particles", self.particles.len());
        }

        self.update_particles(&valid);

        if now - self.started_at < self.config.wait_time {
            return None;
        }

        let candidate = self.particle_mean();
        self.phase = BootstrapPhase::AwaitConfirm;
        log::info!(
            "bootstrap candidate: x = {:.3}, y = {:.3}, theta = 0.0",
            candidate.x,
            candidate.y
        );

        if decision.confirm(&candidate) {
            self.phase = BootstrapPhase::Initialized;
            self.result = Some(candidate);
            self.particles.clear();
            log::info!("bootstrap finalized");
            Some(candidate)
        } else {
            self.phase = BootstrapPhase::Idle;
            self.particles.clear();
            log::warn!("bootstrap candidate rejected, restarting");
            None
        }
    }

    /// Back-project particles from the first valid detection.
    ///
    /// Heading hypotheses are drawn near 0 because finalization pins the
    /// orientation to body-x; each hypothesis places the robot so the
    /// observed bearing/range lands on the tag's prior position.
    fn init_particles(&mut self, first: &(Point2D, Point2D)) {
        let (observed, world) = first;
        let bearing = observed.bearing();
        let range = observed.norm();
        let sigma_theta = self.config.bearing_variance.sqrt();
        let sigma_xy = self.config.range_variance.sqrt();

        self.particles = (0..self.config.particles)
            .map(|_| {
                let noise_t: f32 = self.rng.sample(StandardNormal);
                let theta = normalize_angle(noise_t * sigma_theta);
                let heading = theta + bearing;
                let noise_x: f32 = self.rng.sample(StandardNormal);
                let noise_y: f32 = self.rng.sample(StandardNormal);
                Pose2D::new(
                    world.x - range * heading.cos() + noise_x * sigma_xy,
                    world.y - range * heading.sin() + noise_y * sigma_xy,
                    theta,
                )
            })
            .collect();
    }

    /// Reweight against every valid detection and resample.
    fn update_particles(&mut self, valid: &[(Point2D, Point2D)]) {
        let rng_var = self.config.range_variance as f64;
        let brng_var = self.config.bearing_variance as f64;

        let weights: Vec<f64> = self
            .particles
            .iter()
            .map(|particle| {
                let mut log_weight = 0.0;
                for (observed, world) in valid {
                    let observed_bearing = observed.bearing();
                    let observed_range = observed.norm();
                    let local = particle.inverse_transform_point(world);
                    let range_err = (local.norm() - observed_range) as f64;
                    let bearing_err =
                        normalize_angle(local.bearing() - observed_bearing) as f64;
                    log_weight -= range_err * range_err / (2.0 * rng_var);
                    log_weight -= bearing_err * bearing_err / (2.0 * brng_var);
                }
                log_weight
            })
            .collect();

        let max_log = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max_log.is_finite() {
            log::warn!("all particles have zero likelihood, keeping current set");
            return;
        }
        let weights: Vec<f64> = weights.iter().map(|w| (w - max_log).exp()).collect();
        let total: f64 = weights.iter().sum();
        if total < 1e-300 {
            return;
        }

        self.resample(&weights, total);
    }

    /// Low-variance resampling with slight roughening.
    fn resample(&mut self, weights: &[f64], total: f64) {
        let n = self.particles.len();
        let mut cumulative = Vec::with_capacity(n);
        let mut sum = 0.0;
        for w in weights {
            sum += w / total;
            cumulative.push(sum);
        }

        let step = 1.0 / n as f64;
        let mut r = self.rng.gen::<f64>() * step;
        let mut idx = 0;
        let sigma_xy = self.config.range_variance.sqrt() * 0.1;
        let sigma_theta = self.config.bearing_variance.sqrt() * 0.1;

        let mut resampled = Vec::with_capacity(n);
        for _ in 0..n {
            while r > cumulative[idx] && idx < n - 1 {
                idx += 1;
            }
            let source = self.particles[idx];
            let jx: f32 = self.rng.sample(StandardNormal);
            let jy: f32 = self.rng.sample(StandardNormal);
            let jt: f32 = self.rng.sample(StandardNormal);
            resampled.push(Pose2D::new(
                source.x + jx * sigma_xy,
                source.y + jy * sigma_xy,
                source.theta + jt * sigma_theta,
            ));
            r += step;
        }
        self.particles = resampled;
    }

    /// Mean over all particles, orientation pinned to 0.
    fn particle_mean(&self) -> Pose2D {
        let n = self.particles.len() as f32;
        let sum_x: f32 = self.particles.iter().map(|p| p.x).sum();
        let sum_y: f32 = self.particles.iter().map(|p| p.y).sum();
        Pose2D::new(sum_x / n, sum_y / n, 0.0)
    }
}
