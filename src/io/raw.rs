/// Read / write images as raw little-endian `f32`, in linear bin order

use std::fs::File;
use std::io::{Write, Read, BufWriter, BufReader};
use std::path::Path;

type IORes<T> = std::io::Result<T>;

pub fn write(data: impl Iterator<Item = f32>, path: &Path) -> IORes<()> {
    let mut buf = BufWriter::new(File::create(path)?);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    buf.flush()
}

/// Narrow an accumulated image to single precision on the way out
pub fn write_image(image: &[f64], path: &Path) -> IORes<()> {
    write(image.iter().map(|&x| x as f32), path)
}

pub fn read<'a>(path: &Path) -> IORes<impl Iterator<Item = IORes<f32>> + 'a> {
    let mut buf = BufReader::new(File::open(path)?);
    let mut buffer = [0; 4];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(f32::from_le_bytes(buffer))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Read a whole image, checking that it has the expected number of bins
pub fn read_image(path: &Path, n_bins: usize) -> IORes<Vec<f32>> {
    let image = read(path)?.collect::<IORes<Vec<_>>>()?;
    if image.len() != n_bins {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} holds {} bins, expected {n_bins}", path.display(), image.len())))
    }
    Ok(image)
}
