//! Per-class affine transforms and the linear solver.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array1, Array2};

use crate::error::AdaptError;
use crate::stats::Stats;

/// Pivots below this magnitude mark the system as numerically singular.
const SINGULARITY_EPS: f64 = 1e-12;

/// One regression class: `adapted_mean = a * mean + b`.
#[derive(Debug, Clone)]
pub struct ClassTransform {
    pub a: Array2<f64>,
    pub b: Array1<f64>,
}

impl ClassTransform {
    pub fn identity(dim: usize) -> Self {
        ClassTransform {
            a: Array2::eye(dim),
            b: Array1::zeros(dim),
        }
    }

    pub fn dimension(&self) -> usize {
        self.b.len()
    }
}

/// Outcome of one solve pass. Degenerate classes fell back to the identity
/// transform; adaptation still proceeds.
#[derive(Debug, Clone, Default)]
pub struct SolveReport {
    pub num_classes: usize,
    pub degenerate: Vec<usize>,
    pub frames: u64,
}

impl SolveReport {
    pub fn is_clean(&self) -> bool {
        self.degenerate.is_empty()
    }
}

/// The full set of per-class affine transforms.
#[derive(Debug, Clone)]
pub struct Transform {
    classes: Vec<ClassTransform>,
}

impl Transform {
    pub fn identity(num_classes: usize, dim: usize) -> Self {
        Transform {
            classes: (0..num_classes).map(|_| ClassTransform::identity(dim)).collect(),
        }
    }

    pub fn from_classes(classes: Vec<ClassTransform>) -> Self {
        Transform { classes }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn dimension(&self) -> usize {
        self.classes.first().map_or(0, ClassTransform::dimension)
    }

    pub fn class(&self, class: usize) -> &ClassTransform {
        &self.classes[class]
    }

    /// Re-estimates every class from the accumulated statistics. Each row
    /// `i` solves `G[c][i] w = z[c][i]`; a singular system leaves row `i`
    /// of that class at the identity.
    pub fn update(&mut self, stats: &Stats) -> SolveReport {
        let dim = stats.dimension();
        let mut report = SolveReport {
            num_classes: stats.num_classes(),
            degenerate: Vec::new(),
            frames: stats.frames(),
        };

        self.classes.clear();
        for class in 0..stats.num_classes() {
            let mut transform = ClassTransform::identity(dim);
            let mut degenerate = false;
            for i in 0..dim {
                match solve_row(stats.regression(class, i), stats.z_vector(class, i)) {
                    Some(w) => {
                        for j in 0..dim {
                            transform.a[[i, j]] = w[j];
                        }
                        transform.b[i] = w[dim];
                    }
                    None => degenerate = true, // row stays e_i | 0
                }
            }
            if degenerate {
                report.degenerate.push(class);
                tracing::warn!(
                    class,
                    occupancy = stats.class_occupancy(class),
                    "singular regression class, using identity transform"
                );
            }
            self.classes.push(transform);
        }

        tracing::info!(
            classes = report.num_classes,
            degenerate = report.degenerate.len(),
            frames = report.frames,
            "transform estimation finished"
        );
        report
    }

    /// Reads a pre-computed transform file: `K`, then per class the
    /// dimension `d` and `d * (d + 1)` floats, each row laid out `[A_i | b_i]`.
    pub fn load(path: impl AsRef<Path>) -> Result<Transform, AdaptError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AdaptError::io(path, e))?;
        let mut reader = BufReader::new(file);

        let num_classes = reader
            .read_i32::<NativeEndian>()
            .map_err(|e| AdaptError::io(path, e))?;
        if num_classes <= 0 {
            return Err(AdaptError::corrupt(
                path,
                format!("class count {}", num_classes),
            ));
        }

        let mut classes = Vec::with_capacity(num_classes as usize);
        let mut dim = None;
        for _ in 0..num_classes {
            let d = reader
                .read_i32::<NativeEndian>()
                .map_err(|e| AdaptError::io(path, e))?;
            if d <= 0 {
                return Err(AdaptError::corrupt(path, format!("dimension {}", d)));
            }
            let d = d as usize;
            match dim {
                None => dim = Some(d),
                Some(expected) if expected != d => {
                    return Err(AdaptError::corrupt(
                        path,
                        format!("class dimension {} != {}", d, expected),
                    ))
                }
                _ => {}
            }

            let mut transform = ClassTransform::identity(d);
            for i in 0..d {
                for j in 0..=d {
                    let value = f64::from(
                        reader
                            .read_f32::<NativeEndian>()
                            .map_err(|e| AdaptError::io(path, e))?,
                    );
                    if j < d {
                        transform.a[[i, j]] = value;
                    } else {
                        transform.b[i] = value;
                    }
                }
            }
            classes.push(transform);
        }

        tracing::info!(path = %path.display(), classes = classes.len(), "loaded transform file");
        Ok(Transform { classes })
    }

    /// Mirror of `load`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AdaptError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| AdaptError::io(path, e))?;
        let mut writer = BufWriter::new(file);

        writer
            .write_i32::<NativeEndian>(self.classes.len() as i32)
            .map_err(|e| AdaptError::io(path, e))?;
        for transform in &self.classes {
            let d = transform.dimension();
            writer
                .write_i32::<NativeEndian>(d as i32)
                .map_err(|e| AdaptError::io(path, e))?;
            for i in 0..d {
                for j in 0..=d {
                    let value = if j < d {
                        transform.a[[i, j]]
                    } else {
                        transform.b[i]
                    };
                    writer
                        .write_f32::<NativeEndian>(value as f32)
                        .map_err(|e| AdaptError::io(path, e))?;
                }
            }
        }
        writer.flush().map_err(|e| AdaptError::io(path, e))
    }
}

/// Gaussian elimination with partial pivoting; `None` when the system is
/// numerically singular.
fn solve_row(g: &Array2<f64>, z: &Array1<f64>) -> Option<Vec<f64>> {
    let n = z.len();
    let mut m = g.clone();
    let mut rhs = z.to_vec();

    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot = m[[col, col]].abs();
        for row in col + 1..n {
            let candidate = m[[row, col]].abs();
            if candidate > pivot {
                pivot = candidate;
                pivot_row = row;
            }
        }
        if pivot < SINGULARITY_EPS {
            return None;
        }
        if pivot_row != col {
            for j in 0..n {
                m.swap([col, j], [pivot_row, j]);
            }
            rhs.swap(col, pivot_row);
        }
        for row in col + 1..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                m[[row, j]] -= factor * m[[col, j]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut w = vec![0.0f64; n];
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for j in row + 1..n {
            acc -= m[[row, j]] * w[j];
        }
        w[row] = acc / m[[row, row]];
    }
    Some(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_solve_known_system() {
        // [2 1; 1 3] w = [5; 10] -> w = [1, 3]
        let g = arr2(&[[2.0, 1.0], [1.0, 3.0]]);
        let z = Array1::from(vec![5.0, 10.0]);
        let w = solve_row(&g, &z).unwrap();
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!((w[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_needs_pivoting() {
        // Zero on the leading diagonal forces a row swap
        let g = arr2(&[[0.0, 1.0], [1.0, 0.0]]);
        let z = Array1::from(vec![2.0, 3.0]);
        let w = solve_row(&g, &z).unwrap();
        assert!((w[0] - 3.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_system_is_none() {
        let g = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        let z = Array1::from(vec![1.0, 2.0]);
        assert!(solve_row(&g, &z).is_none());
    }

    #[test]
    fn test_identity_has_unit_rows() {
        let t = Transform::identity(3, 2);
        assert_eq!(t.num_classes(), 3);
        assert_eq!(t.dimension(), 2);
        let c = t.class(1);
        assert_eq!(c.a[[0, 0]], 1.0);
        assert_eq!(c.a[[0, 1]], 0.0);
        assert_eq!(c.b[1], 0.0);
    }
}
