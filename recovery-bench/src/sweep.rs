// Copyright (c) Recovery Bench Developers.
use anyhow::{bail, Context, Result};
use std::fmt;

use recovery_bench_intf::{ParamValue, RecoveryConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Dimension {
    // Varies a RecoveryConfig field.
    Param {
        name: String,
        values: Vec<ParamValue>,
    },
    // Varies a coordinate which only feeds derived relations and rows,
    // e.g. the partition size in megabytes.
    Coord {
        name: String,
        values: Vec<ParamValue>,
    },
}

impl Dimension {
    pub fn name(&self) -> &str {
        match self {
            Self::Param { name, .. } | Self::Coord { name, .. } => name,
        }
    }

    pub fn values(&self) -> &[ParamValue] {
        match self {
            Self::Param { values, .. } | Self::Coord { values, .. } => values,
        }
    }
}

type DeriveFn = Box<dyn Fn(&Coords) -> Result<ParamValue>>;

struct Derived {
    name: String,
    func: DeriveFn,
}

/// Coordinates of one sweep point in dimension declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coords(Vec<(String, ParamValue)>);

impl Coords {
    pub fn push(&mut self, name: &str, val: ParamValue) {
        self.0.push((name.to_string(), val));
    }

    pub fn get(&self, name: &str) -> Result<&ParamValue> {
        match self.0.iter().find(|(k, _)| k == name) {
            Some((_, v)) => Ok(v),
            None => bail!("unknown sweep coordinate {:?}", name),
        }
    }

    pub fn u64(&self, name: &str) -> Result<u64> {
        self.get(name)?.as_u64()
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.get(name)?.as_f64()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.0.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub index: usize,
    pub coords: Coords,
    pub config: RecoveryConfig,
    // Record a placeholder row instead of running a recovery.
    pub skip: bool,
}

/// An ordered parameter sweep over a base configuration. The first
/// dimension is the outermost loop and the last one varies fastest.
/// Generating points has no side effects and `iter()` can be called any
/// number of times.
pub struct Sweep {
    base: RecoveryConfig,
    dims: Vec<Dimension>,
    derived: Vec<Derived>,
    skip: bool,
}

impl Sweep {
    pub fn new(base: RecoveryConfig) -> Self {
        Self {
            base,
            dims: vec![],
            derived: vec![],
            skip: false,
        }
    }

    pub fn vary<V: Into<ParamValue>>(mut self, name: &str, values: Vec<V>) -> Self {
        self.dims.push(Dimension::Param {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn coord<V: Into<ParamValue>>(mut self, name: &str, values: Vec<V>) -> Self {
        self.dims.push(Dimension::Coord {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Sets parameter `name` from the point's coordinates. Relations are
    /// applied in declaration order after all dimensions.
    pub fn derive<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&Coords) -> Result<ParamValue> + 'static,
    {
        self.derived.push(Derived {
            name: name.into(),
            func: Box::new(func),
        });
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.dims.iter().map(|dim| dim.values().len()).product()
    }

    pub fn point(&self, index: usize) -> Result<SweepPoint> {
        if index >= self.len() {
            bail!("sweep point {} out of range ({})", index, self.len());
        }

        // Mixed-radix decomposition with the last dimension as the least
        // significant digit.
        let mut digits = vec![0; self.dims.len()];
        let mut rem = index;
        for (i, dim) in self.dims.iter().enumerate().rev() {
            let nr = dim.values().len();
            digits[i] = rem % nr;
            rem /= nr;
        }

        let mut coords = Coords::default();
        let mut config = self.base.clone();
        for (dim, digit) in self.dims.iter().zip(digits.into_iter()) {
            let val = &dim.values()[digit];
            if let Dimension::Param { name, .. } = dim {
                config
                    .set(name, val)
                    .with_context(|| format!("sweep dimension {:?}", name))?;
            }
            coords.push(dim.name(), val.clone());
        }

        for derived in self.derived.iter() {
            let val = (derived.func)(&coords)
                .with_context(|| format!("deriving {:?} from {}", &derived.name, &coords))?;
            config
                .set(&derived.name, &val)
                .with_context(|| format!("derived parameter {:?}", &derived.name))?;
        }

        Ok(SweepPoint {
            index,
            coords,
            config,
            skip: self.skip,
        })
    }

    pub fn iter(&self) -> SweepIter {
        SweepIter {
            sweep: self,
            next: 0,
        }
    }
}

pub struct SweepIter<'a> {
    sweep: &'a Sweep,
    next: usize,
}

impl<'a> Iterator for SweepIter<'a> {
    type Item = Result<SweepPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.sweep.len() {
            return None;
        }
        let point = self.sweep.point(self.next);
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.sweep.len() - self.next.min(self.sweep.len());
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::Sweep;
    use recovery_bench_intf::{ParamValue, RecoveryConfig};

    #[test]
    fn test_sweep_order_and_count() {
        let sweep = Sweep::new(RecoveryConfig::default())
            .vary("num_partitions", vec![1u32, 2])
            .vary("num_backups", vec![6u32, 7, 8]);
        assert_eq!(sweep.len(), 6);

        let pairs: Vec<(u32, u32)> = sweep
            .iter()
            .map(|pt| {
                let pt = pt.unwrap();
                (pt.config.num_partitions, pt.config.num_backups)
            })
            .collect();
        assert_eq!(
            pairs,
            vec![(1, 6), (1, 7), (1, 8), (2, 6), (2, 7), (2, 8)]
        );

        // Restartable
        assert_eq!(sweep.iter().count(), 6);
        assert_eq!(sweep.iter().nth(4).unwrap().unwrap().index, 4);
    }

    #[test]
    fn test_no_dimensions() {
        let sweep = Sweep::new(RecoveryConfig::default());
        assert_eq!(sweep.len(), 1);
        let pts: Vec<_> = sweep.iter().collect();
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].as_ref().unwrap().config, RecoveryConfig::default());
    }

    #[test]
    fn test_derived_and_coords() {
        let sweep = Sweep::new(RecoveryConfig::default())
            .vary("object_size", vec![128u64, 1024])
            .coord("partition_mb", vec![1u64, 101])
            .derive("num_objects", |coords| {
                let per_mb = RecoveryConfig::objects_per_mb(coords.u64("object_size")?);
                Ok(ParamValue::from((per_mb * coords.f64("partition_mb")?) as u64))
            });

        let pts: Vec<_> = sweep.iter().map(|pt| pt.unwrap()).collect();
        assert_eq!(pts.len(), 4);
        assert_eq!(pts[0].config.num_objects, 6241);
        assert_eq!(pts[1].config.num_objects, 630393);
        assert_eq!(pts[3].config.object_size, 1024);
        assert_eq!(pts[3].config.num_objects, 99535);
        assert_eq!(pts[1].coords.u64("partition_mb").unwrap(), 101);
        assert_eq!(format!("{}", &pts[1].coords), "object_size=128 partition_mb=101");

        let sweep = Sweep::new(RecoveryConfig::default())
            .vary("num_partitions", (1..=12u32).rev().collect::<Vec<u32>>())
            .derive("num_backups", |coords| {
                Ok(ParamValue::from((6 * coords.u64("num_partitions")?).min(70)))
            });
        let backups: Vec<u32> = sweep
            .iter()
            .map(|pt| pt.unwrap().config.num_backups)
            .collect();
        assert_eq!(backups, vec![70, 66, 60, 54, 48, 42, 36, 30, 24, 18, 12, 6]);
    }

    #[test]
    fn test_unknown_param_and_skip() {
        let sweep = Sweep::new(RecoveryConfig::default()).vary("numBackups", vec![1u32]);
        assert!(sweep.iter().next().unwrap().is_err());

        let sweep = Sweep::new(RecoveryConfig::default())
            .vary("num_partitions", vec![1u32, 2, 3])
            .skip(true);
        assert!(sweep.iter().all(|pt| pt.unwrap().skip));
    }
}
