//! Raw and refined trajectory CSV logs.
//!
//! Both files carry a `time,x,y,theta` header and are opened once at
//! startup; rows are appended from the odometry callback only.

use std::fs::File;
use std::path::Path;

use crate::core::types::Pose2D;
use crate::error::Result;

/// Append-only CSV writer for one trajectory stream.
pub struct TrajectoryWriter {
    writer: csv::Writer<File>,
}

impl TrajectoryWriter {
    /// Create the file and write the header.
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(["time", "x", "y", "theta"])?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Append one pose row.
    pub fn append(&mut self, stamp: f64, pose: &Pose2D) -> Result<()> {
        self.writer.write_record([
            format!("{:.6}", stamp),
            format!("{:.6}", pose.x),
            format!("{:.6}", pose.y),
            format!("{:.6}", pose.theta),
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}
