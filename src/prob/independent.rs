use std::any::Any;
use std::fmt::{self, Display};
use rand::RngCore;
use crate::prob::*;
use crate::calc;
use crate::error::{Error, Result};
use crate::model::{self, Record};

/// Joint distribution of independent blocks of columns. Each part is a
/// distribution bound to an ordered set of column indices; the index sets
/// partition 0..d. A part bound to a single column is a univariate factor; a part
/// bound to several columns (a multivariate Gaussian, a conditional table, a
/// nested Independent) models that block jointly.
///
/// log p(x) is the sum of each part's log-probability over its projection of x,
/// and estimation routes the projected columns to each part.
#[derive(Debug, Clone)]
pub struct Independent {

    parts : Vec<(Box<dyn Distribution>, Vec<usize>)>,

    d : usize,

    frozen : bool

}

impl Independent {

    /// Binds each distribution to its column block. Fails when the blocks do not
    /// partition the columns or when a block width differs from the dimension of
    /// its distribution.
    pub fn new(parts : Vec<(Box<dyn Distribution>, Vec<usize>)>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::ModelConfiguration("Independent distribution requires at least one part".to_string()));
        }
        let d : usize = parts.iter().map(|(_, cols)| cols.len() ).sum();
        let mut seen = vec![false; d];
        for (dist, cols) in parts.iter() {
            if dist.dim() != cols.len() {
                return Err(Error::ModelConfiguration(format!(
                    "{} of dimension {} bound to {} columns",
                    dist.kind(),
                    dist.dim(),
                    cols.len()
                )));
            }
            for c in cols.iter() {
                if *c >= d || seen[*c] {
                    return Err(Error::ModelConfiguration(format!(
                        "Column blocks do not partition 0..{} (column {})", d, c
                    )));
                }
                seen[*c] = true;
            }
        }
        Ok(Self { parts, d, frozen : false })
    }

    /// One univariate distribution per column, in column order.
    pub fn univariate(dists : Vec<Box<dyn Distribution>>) -> Result<Self> {
        let mut col = 0;
        let mut parts = Vec::new();
        for dist in dists {
            let width = dist.dim();
            parts.push((dist, (col..col + width).collect()));
            col += width;
        }
        Self::new(parts)
    }

    pub fn parts(&self) -> &[(Box<dyn Distribution>, Vec<usize>)] {
        &self.parts
    }

    pub fn part(&self, ix : usize) -> Option<&dyn Distribution> {
        self.parts.get(ix).map(|(d, _)| d.as_ref() )
    }

    fn project(x : &[Datum], cols : &[usize]) -> Row {
        cols.iter().map(|c| x[*c].clone() ).collect()
    }

    pub(crate) fn from_record(rec : &Record) -> Result<Self> {
        expect_record(rec, "Independent", 1)?;
        let blocks = rec.parameters[0].as_array()
            .ok_or_else(|| Error::Schema("Independent record requires the column blocks".to_string()) )?;
        if blocks.len() != rec.components.len() {
            return Err(Error::Schema(format!(
                "Independent record has {} blocks for {} components",
                blocks.len(),
                rec.components.len()
            )));
        }
        let mut parts = Vec::new();
        for (block, comp) in blocks.iter().zip(rec.components.iter()) {
            let cols = block.as_array()
                .and_then(|b| b.iter().map(|c| c.as_u64().map(|c| c as usize ) ).collect::<Option<Vec<_>>>() )
                .ok_or_else(|| Error::Schema(format!("Invalid column block: {}", block)) )?;
            parts.push((model::from_record(comp)?, cols));
        }
        Self::new(parts).map_err(|e| Error::Schema(e.to_string()) )
    }

}

impl Distribution for Independent {

    fn kind(&self) -> &'static str {
        "Independent"
    }

    fn dim(&self) -> usize {
        self.d
    }

    fn log_probability(&self, x : &[Datum]) -> Result<f64> {
        check_dim(x, self.d)?;
        let mut lp = 0.0;
        for (dist, cols) in self.parts.iter() {
            lp += dist.log_probability(&Self::project(x, cols))?;
            if lp == f64::NEG_INFINITY {
                break;
            }
        }
        Ok(lp)
    }

    fn sample(&self, rng : &mut dyn RngCore) -> Row {
        let mut row = vec![Datum::Missing; self.d];
        for (dist, cols) in self.parts.iter() {
            for (c, v) in cols.iter().zip(dist.sample(rng)) {
                row[*c] = v;
            }
        }
        row
    }

    fn summarize(&mut self, xs : &[Row], weights : Option<&[f64]>) -> Result<()> {
        let ws = calc::resolve_weights(xs.len(), weights)?;
        for x in xs.iter() {
            check_dim(x, self.d)?;
        }
        for (dist, cols) in self.parts.iter_mut() {
            let proj : Vec<Row> = xs.iter().map(|x| Self::project(x, cols) ).collect();
            dist.summarize(&proj, Some(&ws[..]))?;
        }
        Ok(())
    }

    /// Updates every part. A part without data keeps its parameters unless no
    /// part received any data, in which case the update fails. When any part
    /// fails, no part changes and every accumulator is cleared.
    fn from_summaries(&mut self, inertia : f64) -> Result<()> {
        calc::check_inertia(inertia)?;
        if self.frozen {
            return Ok(());
        }
        if self.parts.iter().all(|(d, _)| d.summary_weight() <= 0.0 ) {
            self.clear_summaries();
            return Err(no_weight(self.kind()));
        }
        let mut parts : Vec<&mut Box<dyn Distribution>> = self.parts.iter_mut().map(|(d, _)| d ).collect();
        update_jointly(&mut parts, inertia, false)?;
        Ok(())
    }

    fn clear_summaries(&mut self) {
        self.parts.iter_mut().for_each(|(d, _)| d.clear_summaries() );
    }

    fn merge_summaries(&mut self, other : &dyn Distribution) -> Result<()> {
        let other = peer(self, other)?;
        if other.parts.len() != self.parts.len() {
            return Err(Error::ModelConfiguration("Cannot merge Independent statistics of different structure".to_string()));
        }
        for ((dst, _), (src, _)) in self.parts.iter_mut().zip(other.parts.iter()) {
            dst.merge_summaries(src.as_ref())?;
        }
        Ok(())
    }

    fn summary_weight(&self) -> f64 {
        self.parts.iter().map(|(d, _)| d.summary_weight() ).fold(0.0, f64::max)
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn thaw(&mut self) {
        self.frozen = false;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn blank(&self) -> Box<dyn Distribution> {
        Box::new(Independent {
            parts : self.parts.iter().map(|(d, cols)| (d.blank(), cols.clone()) ).collect(),
            d : self.d,
            frozen : false
        })
    }

    fn boxed_clone(&self) -> Box<dyn Distribution> {
        Box::new(self.clone())
    }

    fn to_record(&self) -> Record {
        let blocks : Vec<_> = self.parts.iter().map(|(_, cols)| serde_json::json!(cols) ).collect();
        Record::new(self.kind(), self.d, vec![serde_json::Value::Array(blocks)])
            .with_components(self.parts.iter().map(|(d, _)| d.to_record() ).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

}

impl Display for Independent {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Independent(")?;
        for (i, (dist, cols)) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} @ {:?}", dist.kind(), cols)?;
        }
        write!(f, ")")
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    fn mixed() -> Independent {
        Independent::univariate(vec![
            Box::new(Normal::new(0.0, 1.0)),
            Box::new(Discrete::new(vec![("a", 0.25), ("b", 0.75)]).unwrap())
        ]).unwrap()
    }

    #[test]
    fn log_probability_sums_parts() {
        let ind = mixed();
        let x = vec![Datum::Real(0.5), Datum::from("b")];
        let expected = Normal::new(0.0, 1.0).log_probability(&x[0..1]).unwrap() + 0.75f64.ln();
        assert!((ind.log_probability(&x).unwrap() - expected).abs() < 1E-12);
        assert!(matches!(ind.log_probability(&x[0..1]), Err(Error::Shape { .. })));
    }

    #[test]
    fn columns_must_partition() {
        let bad = Independent::new(vec![
            (Box::new(Normal::new(0.0, 1.0)) as Box<dyn Distribution>, vec![0]),
            (Box::new(Normal::new(0.0, 1.0)) as Box<dyn Distribution>, vec![0])
        ]);
        assert!(matches!(bad, Err(Error::ModelConfiguration(_))));
    }

    #[test]
    fn fit_routes_columns() {
        let mut ind = mixed();
        let xs = vec![
            vec![Datum::Real(1.0), Datum::from("a")],
            vec![Datum::Real(3.0), Datum::from("a")]
        ];
        ind.fit(&xs, None, 0.0).unwrap();
        let n = ind.part(0).unwrap().as_any().downcast_ref::<Normal>().unwrap();
        assert!((n.mean() - 2.0).abs() < 1E-12);
        let d = ind.part(1).unwrap().as_any().downcast_ref::<Discrete>().unwrap();
        assert_eq!(d.prob_of("a"), 1.0);
        assert_eq!(d.prob_of("b"), 0.0);
    }

    #[test]
    fn failing_part_leaves_others_unchanged() {
        let mut ind = Independent::univariate(vec![
            Box::new(Normal::new(0.0, 1.0)),
            Box::new(Gamma::new(2.0, 1.0))
        ]).unwrap();
        let xs = vec![
            vec![Datum::Real(10.0), Datum::Real(3.0)],
            vec![Datum::Real(12.0), Datum::Real(3.0)]
        ];
        assert!(matches!(ind.fit(&xs, None, 0.0), Err(Error::InsufficientData(_))));
        let n = ind.part(0).unwrap().as_any().downcast_ref::<Normal>().unwrap();
        assert_eq!(n.mean(), 0.0);
        assert_eq!(ind.summary_weight(), 0.0);
        assert!(ind.parts().iter().all(|(d, _)| d.summary_weight() == 0.0 ));
    }

}
