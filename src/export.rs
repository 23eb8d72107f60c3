// src/export.rs - Motion channel table export
use crate::bvh::{fixed, BvhDocument};
use crate::error::{Error, Result};
use crate::skeleton::SkeletonTopology;
use csv::Writer;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

// `<Joint>_<Channel>` for every motion value, in motion-line order.
pub fn channel_columns(topology: &SkeletonTopology) -> Vec<String> {
    topology
        .joints
        .iter()
        .flat_map(|joint| {
            joint
                .channels
                .iter()
                .map(move |channel| format!("{}_{}", joint.name, channel.name()))
        })
        .collect()
}

// Writes the motion block of BVH documents as CSV tables, one row per frame.
pub struct MotionExporter {
    output_dir: PathBuf,
}

impl MotionExporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn export_csv(&self, stem: &str, document: &BvhDocument<'_>) -> Result<PathBuf> {
        let csv_path = self.output_dir.join(format!("{stem}_motion.csv"));

        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let file = File::create(&csv_path).map_err(|e| Error::io(&csv_path, e))?;
        let mut writer = Writer::from_writer(file);

        let mut header = vec!["frame".to_string(), "time".to_string()];
        header.extend(channel_columns(document.topology));
        writer.write_record(&header)?;

        for (i, frame) in document.frames.iter().enumerate() {
            let mut record = Vec::with_capacity(header.len());
            record.push(i.to_string());
            record.push(format!("{:.6}", i as f64 * document.frame_time));
            record.extend(frame.values.iter().map(|v| format!("{:.6}", fixed(*v))));
            writer.write_record(&record)?;
        }

        writer.flush().map_err(|e| Error::io(&csv_path, e))?;
        info!(path = %csv_path.display(), rows = document.frames.len(), "motion CSV written");
        Ok(csv_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::RestPose;
    use crate::rotation::BvhMotionFrame;
    use crate::skeleton::ModelVariant;
    use nalgebra::Vector3;

    #[test]
    fn test_channel_columns() {
        let topo = SkeletonTopology::get(ModelVariant::Lightweight19);
        let columns = channel_columns(topo);
        assert_eq!(columns.len(), topo.channel_count());
        assert_eq!(columns[0], "Hips_Xposition");
        assert_eq!(columns[5], "Hips_Yrotation");
        assert_eq!(columns[6], "Spine_Zrotation");
    }

    #[test]
    fn test_export_writes_one_row_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let topo = SkeletonTopology::get(ModelVariant::VideoPose17);
        let rest = RestPose {
            offsets: vec![Vector3::zeros(); topo.len()],
            rest_directions: vec![Vector3::y(); topo.len()],
            frame_index: 0,
        };
        let mut moved = BvhMotionFrame::rest(topo);
        moved.values[1] = 1.25;
        moved.values[2] = -1e-12;
        let doc = BvhDocument::new(topo, &rest, vec![BvhMotionFrame::rest(topo), moved]);

        let out = dir.path().join("nested");
        let path = MotionExporter::new(&out).export_csv("clip_videopose3d", &doc).unwrap();
        assert_eq!(path, out.join("clip_videopose3d_motion.csv"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 2 + topo.channel_count());
        assert_eq!(&headers[2], "Hips_Xposition");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][0], "1");
        assert_eq!(&rows[1][1], "0.020000");
        assert_eq!(&rows[1][3], "1.250000");
        assert_eq!(&rows[1][4], "0.000000");
    }
}
