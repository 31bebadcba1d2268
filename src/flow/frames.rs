use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use image::io::Reader as ImageReader;
use ndarray::Array2;

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// A video directory holding `flow_x*` / `flow_y*` frame pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    pub class_id: usize,
    /// Ordinal inside the class, in sorted directory order.
    pub video_id: usize,
    pub dir: PathBuf,
    pub x_frames: Vec<PathBuf>,
    pub y_frames: Vec<PathBuf>,
}

impl VideoSource {
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    pub fn frame_count(&self) -> usize {
        self.x_frames.len()
    }

    pub fn frame_pairs(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.x_frames
            .iter()
            .map(|p| p.as_path())
            .zip(self.y_frames.iter().map(|p| p.as_path()))
    }
}

/// Lists `<data_dir>/<class>/<video>/` directories for every class, videos
/// sorted by name. Every listed video is returned, short ones included.
pub fn discover_videos(data_dir: &Path, classes: &[String]) -> Result<Vec<VideoSource>> {
    let mut videos = Vec::new();
    for (class_id, class) in classes.iter().enumerate() {
        let class_dir = data_dir.join(class);
        if !class_dir.is_dir() {
            bail!("missing class directory {}", class_dir.display());
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(&class_dir)
            .with_context(|| format!("failed to list {}", class_dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        for (video_id, dir) in dirs.into_iter().enumerate() {
            let x_frames = list_frames(&dir, "flow_x")?;
            let y_frames = list_frames(&dir, "flow_y")?;
            if x_frames.len() != y_frames.len() {
                bail!(
                    "video {} has {} flow_x frames but {} flow_y frames",
                    dir.display(),
                    x_frames.len(),
                    y_frames.len()
                );
            }
            videos.push(VideoSource {
                class_id,
                video_id,
                dir,
                x_frames,
                y_frames,
            });
        }
    }
    Ok(videos)
}

fn list_frames(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            let name_ok = p
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix));
            let ext_ok = p
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            name_ok && ext_ok
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// Decodes one flow frame as grayscale intensities.
pub fn decode_frame(path: &Path, height: usize, width: usize) -> Result<Array2<f64>> {
    let img = ImageReader::open(path)
        .with_context(|| format!("failed to open frame {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode frame {}", path.display()))?
        .to_luma8();
    let (w, h) = (img.width() as usize, img.height() as usize);
    if (h, w) != (height, width) {
        bail!(
            "frame {} is {}x{}, expected {}x{}",
            path.display(),
            h,
            w,
            height,
            width
        );
    }
    Ok(Array2::from_shape_fn((h, w), |(y, x)| {
        f64::from(img.get_pixel(x as u32, y as u32)[0])
    }))
}
