//! Core types for **strand records**: one kinetic measurement at one
//! `(reference, position, strand)`.
//!
//! Records are produced once by a [`crate::stream::KineticSource`] and then
//! flow read-only through every encoder. Nothing in this crate mutates a
//! record after it has been built.
use core::fmt;

/// Orientation of the sequenced molecule relative to the reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    /// Tabular/columnar strand flag: `0` forward, `1` reverse.
    pub fn flag(self) -> u32 {
        match self {
            Strand::Forward => 0,
            Strand::Reverse => 1,
        }
    }

    /// Inverse of [`Strand::flag`]; any other value is `None`.
    pub fn from_flag(flag: u32) -> Option<Self> {
        match flag {
            0 => Some(Strand::Forward),
            1 => Some(Strand::Reverse),
            _ => None,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "forward"),
            Strand::Reverse => write!(f, "reverse"),
        }
    }
}

/// Which strand of a position pair is emitted first.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StrandOrder {
    #[default]
    ForwardFirst,
    ReverseFirst,
}

impl StrandOrder {
    /// Both strands in emission order.
    pub fn strands(self) -> [Strand; 2] {
        match self {
            StrandOrder::ForwardFirst => [Strand::Forward, Strand::Reverse],
            StrandOrder::ReverseFirst => [Strand::Reverse, Strand::Forward],
        }
    }
}

impl std::str::FromStr for StrandOrder {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward-first" | "forward" | "fwd" | "+" => Ok(Self::ForwardFirst),
            "reverse-first" | "reverse" | "rev" | "-" => Ok(Self::ReverseFirst),
            other => Err(format!("Unknown strand order: {}", other)),
        }
    }
}

/// Template base call at a position.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Base { A, C, G, T, N }

impl Base {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Base::A),
            'C' => Some(Base::C),
            'G' => Some(Base::G),
            'T' => Some(Base::T),
            'N' => Some(Base::N),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Base::A => 'A',
            Base::C => 'C',
            Base::G => 'G',
            Base::T => 'T',
            Base::N => 'N',
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_char()) }
}

/// Estimated methylated fraction with its confidence bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MethylFraction {
    pub frac: f64,
    pub frac_low: f64,
    pub frac_up: f64,
}

/// Numeric kinetic fields reported for one strand at one position.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct KineticFields {
    /// Phred-scaled modification score (`-10 log10 p`).
    pub score: u32,
    /// Mean observed IPD.
    pub t_mean: f64,
    /// Standard error of `t_mean`.
    pub t_err: f64,
    /// IPD predicted by the in-silico control model.
    pub model_prediction: f64,
    /// `t_mean / model_prediction`; the primary kinetic signal.
    pub ipd_ratio: f64,
    /// Number of subreads contributing; `0` only on sentinels.
    pub coverage: u32,
    pub fraction: Option<MethylFraction>,
}

/// What a kinetic source reports for one covered strand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub base: Base,
    pub fields: KineticFields,
}

/// One measurement at `(reference, position, strand)`. `position` is 1-based.
#[derive(Clone, Debug, PartialEq)]
pub struct StrandRecord {
    pub reference: String,
    pub position: u32,
    pub strand: Strand,
    pub base: Base,
    pub fields: KineticFields,
}

impl StrandRecord {
    pub fn new(reference: impl Into<String>, position: u32, strand: Strand, m: Measurement) -> Self {
        StrandRecord { reference: reference.into(), position, strand, base: m.base, fields: m.fields }
    }

    /// "No data" stand-in for an uncovered strand whose partner is covered.
    ///
    /// All numeric fields are zero, so the packed track sees the 0 "no signal" value.
    pub fn sentinel(reference: impl Into<String>, position: u32, strand: Strand, base: Base) -> Self {
        StrandRecord { reference: reference.into(), position, strand, base, fields: KineticFields::default() }
    }

    pub fn is_sentinel(&self) -> bool { self.fields.coverage == 0 }

    pub fn ipd_ratio(&self) -> f64 { self.fields.ipd_ratio }
}

/// Watson-Crick complement, used to label the sentinel on the uncovered strand.
pub fn complement(b: Base) -> Base {
    match b {
        Base::A => Base::T,
        Base::T => Base::A,
        Base::C => Base::G,
        Base::G => Base::C,
        Base::N => Base::N,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strand_flags_round_trip() {
        assert_eq!(Strand::Forward.flag(), 0);
        assert_eq!(Strand::Reverse.flag(), 1);
        assert_eq!(Strand::from_flag(1), Some(Strand::Reverse));
        assert_eq!(Strand::from_flag(2), None);
    }

    #[test]
    fn strand_order_parses_and_orders() {
        let o: StrandOrder = "reverse-first".parse().unwrap();
        assert_eq!(o.strands(), [Strand::Reverse, Strand::Forward]);
        assert_eq!(StrandOrder::default().strands()[0], Strand::Forward);
        assert!("sideways".parse::<StrandOrder>().is_err());
    }

    #[test]
    fn sentinel_has_no_signal() {
        let s = StrandRecord::sentinel("chr1", 5, Strand::Reverse, Base::T);
        assert!(s.is_sentinel());
        assert_eq!(s.ipd_ratio(), 0.0);
        assert_eq!(complement(Base::A), Base::T);
        assert_eq!(Base::from_char('g'), Some(Base::G));
        assert_eq!(Base::from_char('x'), None);
    }
}
