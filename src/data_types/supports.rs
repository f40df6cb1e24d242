
use flate2::bufread::MultiGzDecoder;
use log::{debug, info};
use rustc_hash::FxHashSet as HashSet;
use simple_error::bail;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// The observable alleles at a site, the discriminant doubles as the index into per-allele sums
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, strum_macros::Display, strum_macros::EnumString, strum_macros::FromRepr)]
#[strum(ascii_case_insensitive)]
pub enum Allele {
    A=0,
    C=1,
    G=2,
    T=3
}

/// The number of distinct `Allele` values
pub const NUM_ALLELES: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum SupportError {
    #[error("read {read_index} at site {site_index} has invalid weight {weight}, weights must be finite and >= 0")]
    InvalidWeight { read_index: usize, site_index: usize, weight: f64 }
}

/// A single observation of an allele on a read at a polymorphic site
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SupportRecord {
    /// the read that made the observation
    read_index: usize,
    /// the site the observation is for
    site_index: usize,
    /// the observed allele
    allele: Allele,
    /// confidence in the observation; this is the cost of "correcting" it
    weight: f64
}

impl SupportRecord {
    /// Creates a new support record after checking the weight.
    /// # Arguments
    /// * `read_index` - the read index
    /// * `site_index` - the site index
    /// * `allele` - the allele observed on the read at the site
    /// * `weight` - the cost of changing this observation, must be finite and >= 0
    /// # Errors
    /// * if `weight` is negative, NaN, or infinite
    pub fn new(read_index: usize, site_index: usize, allele: Allele, weight: f64) -> Result<SupportRecord, SupportError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SupportError::InvalidWeight { read_index, site_index, weight });
        }
        Ok(SupportRecord {
            read_index,
            site_index,
            allele,
            weight
        })
    }

    /// Creates a record with the default weight of 1.0
    pub fn unweighted(read_index: usize, site_index: usize, allele: Allele) -> SupportRecord {
        SupportRecord {
            read_index,
            site_index,
            allele,
            weight: 1.0
        }
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    pub fn site_index(&self) -> usize {
        self.site_index
    }

    pub fn allele(&self) -> Allele {
        self.allele
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Replaces the allele, mostly useful for building mutated test inputs
    pub fn set_allele(&mut self, allele: Allele) {
        self.allele = allele;
    }
}

/// Loads support records from a whitespace-delimited file, one record per line.
/// Gzipped inputs are detected by a `.gz` extension.
/// # Arguments
/// * `filename` - the file to load
/// # Errors
/// * if the file cannot be opened or read
/// * if any line fails to parse, see `parse_supports(...)`
pub fn load_supports(filename: &Path) -> Result<Vec<SupportRecord>, Box<dyn std::error::Error>> {
    info!("Loading {:?}...", filename);
    let support_file: File = File::open(filename)?;
    let file_reader = BufReader::new(support_file);
    let supports = if filename.extension().unwrap_or_default() == "gz" {
        debug!("Detected gzip extension, loading supports with MultiGzDecoder...");
        let gz_decoder = MultiGzDecoder::new(file_reader);
        parse_supports(BufReader::new(gz_decoder))?
    } else {
        debug!("Loading supports as plain-text file...");
        parse_supports(file_reader)?
    };

    let num_reads: usize = supports.iter()
        .map(|s| s.read_index())
        .collect::<HashSet<usize>>()
        .len();
    let num_sites: usize = supports.iter()
        .map(|s| s.site_index())
        .collect::<HashSet<usize>>()
        .len();
    info!("Finished loading {} supports covering {} reads and {} sites.", supports.len(), num_reads, num_sites);
    Ok(supports)
}

/// Parses support records with the format `readIndex siteIndex allele [weight]`.
/// Blank lines and lines starting with `#` are skipped; a missing weight is 1.0.
/// # Arguments
/// * `reader` - the source of lines
/// # Errors
/// * if a line does not have 3 or 4 fields
/// * if any field fails to parse, or the weight is invalid
pub fn parse_supports<R: BufRead>(reader: R) -> Result<Vec<SupportRecord>, Box<dyn std::error::Error>> {
    let mut supports: Vec<SupportRecord> = vec![];
    for (line_index, line_result) in reader.lines().enumerate() {
        let line: String = line_result?;
        let line_number: usize = line_index + 1;
        let trimmed: &str = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_ascii_whitespace().collect();
        if fields.len() != 3 && fields.len() != 4 {
            bail!("Line {}: expected 3 or 4 fields (readIndex siteIndex allele [weight]), found {}", line_number, fields.len());
        }

        let read_index: usize = match fields[0].parse() {
            Ok(v) => v,
            Err(e) => bail!("Line {}: invalid read index {:?}: {}", line_number, fields[0], e)
        };
        let site_index: usize = match fields[1].parse() {
            Ok(v) => v,
            Err(e) => bail!("Line {}: invalid site index {:?}: {}", line_number, fields[1], e)
        };
        let allele: Allele = match Allele::from_str(fields[2]) {
            Ok(a) => a,
            Err(_) => bail!("Line {}: invalid allele {:?}, expected one of A, C, G, T", line_number, fields[2])
        };
        let weight: f64 = if fields.len() == 4 {
            match fields[3].parse() {
                Ok(v) => v,
                Err(e) => bail!("Line {}: invalid weight {:?}: {}", line_number, fields[3], e)
            }
        } else {
            1.0
        };

        match SupportRecord::new(read_index, site_index, allele, weight) {
            Ok(s) => supports.push(s),
            Err(e) => bail!("Line {}: {}", line_number, e)
        };
    }
    Ok(supports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_allele_parsing() {
        assert_eq!(Allele::from_str("A").unwrap(), Allele::A);
        assert_eq!(Allele::from_str("t").unwrap(), Allele::T);
        assert!(Allele::from_str("N").is_err());
        assert!(Allele::from_str("AC").is_err());
        for v in 0..NUM_ALLELES {
            let allele = Allele::from_repr(v as u8).unwrap();
            assert_eq!(allele as usize, v);
        }
        assert_eq!(Allele::G.to_string(), "G");
    }

    #[test]
    fn test_support_weights() {
        assert!(SupportRecord::new(0, 0, Allele::A, 0.0).is_ok());
        assert!(SupportRecord::new(0, 0, Allele::A, 2.5).is_ok());
        assert!(matches!(
            SupportRecord::new(3, 7, Allele::A, -1.0),
            Err(SupportError::InvalidWeight { read_index: 3, site_index: 7, .. })
        ));
        assert!(SupportRecord::new(0, 0, Allele::A, f64::NAN).is_err());
        assert!(SupportRecord::new(0, 0, Allele::A, f64::INFINITY).is_err());
        assert_eq!(SupportRecord::unweighted(1, 2, Allele::C).weight(), 1.0);
    }

    #[test]
    fn test_parse_supports() {
        let text = "# comment line\n1 1 A 1\n\n1 2 a 0.5\n2 1 T\n  3 4 G 2  \n";
        let supports = parse_supports(text.as_bytes()).unwrap();
        assert_eq!(supports, vec![
            SupportRecord::new(1, 1, Allele::A, 1.0).unwrap(),
            SupportRecord::new(1, 2, Allele::A, 0.5).unwrap(),
            SupportRecord::new(2, 1, Allele::T, 1.0).unwrap(),
            SupportRecord::new(3, 4, Allele::G, 2.0).unwrap()
        ]);
    }

    #[test]
    fn test_parse_errors() {
        let bad_inputs = [
            "1 1\n",
            "1 1 A 1 extra\n",
            "x 1 A 1\n",
            "1 -2 A 1\n",
            "1 1 N 1\n",
            "1 1 A heavy\n",
            "1 1 A -3\n"
        ];
        for &text in bad_inputs.iter() {
            assert!(parse_supports(text.as_bytes()).is_err(), "{text:?} should fail");
        }

        // line numbers should be reported
        let err = parse_supports("1 1 A 1\n2 2 Q 1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("Line 2:"));
    }

    #[test]
    fn test_load_supports() {
        let text = "0 0 A 1\n0 1 C 1\n1 0 G 2\n";
        let temp_dir = std::env::temp_dir();

        let plain_fn = temp_dir.join(format!("mecphase_supports_{}.txt", std::process::id()));
        std::fs::write(&plain_fn, text).unwrap();

        let gz_fn = temp_dir.join(format!("mecphase_supports_{}.txt.gz", std::process::id()));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        std::fs::write(&gz_fn, encoder.finish().unwrap()).unwrap();

        let plain = load_supports(&plain_fn).unwrap();
        let gzipped = load_supports(&gz_fn).unwrap();
        assert_eq!(plain.len(), 3);
        assert_eq!(plain, gzipped);
        assert_eq!(plain[2].weight(), 2.0);

        std::fs::remove_file(&plain_fn).unwrap();
        std::fs::remove_file(&gz_fn).unwrap();
    }
}
