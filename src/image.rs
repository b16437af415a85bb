//! Loading the flat binary image from disk.
//!
//! This is the "external loader" spec.md carves out of the core: it
//! reads exactly [`INST_MEM_SIZE`] bytes into the instruction image and
//! the following [`DATA_MEM_SIZE`] bytes into the data image, reporting
//! a [`LoadError`] on a short read of either region rather than handing
//! [`crate::executor::Machine`] a partially-initialized buffer. Modeled
//! on the teacher's `elf_utils::read_text_instructions`, reading two
//! fixed-size raw regions instead of parsing an ELF container.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::address_space::{DATA_MEM_SIZE, INST_MEM_SIZE};
use crate::error::LoadError;

/// Read `inst_mem`/`data_mem` out of the file at `path`: the first
/// [`INST_MEM_SIZE`] bytes become instruction memory, the next
/// [`DATA_MEM_SIZE`] become data memory.
pub fn load_image(
    path: &Path,
) -> Result<(Box<[u8; INST_MEM_SIZE]>, Box<[u8; DATA_MEM_SIZE]>), LoadError> {
    let mut file = File::open(path).map_err(|source| LoadError::Open {
        path: path.display().to_string(),
        source,
    })?;

    let inst_mem = read_region(&mut file, "instruction memory", INST_MEM_SIZE)?;
    let data_mem = read_region(&mut file, "data memory", DATA_MEM_SIZE)?;

    Ok((inst_mem, data_mem))
}

fn read_region(
    file: &mut File,
    region: &'static str,
    expected: usize,
) -> Result<Box<[u8; 1024]>, LoadError> {
    debug_assert_eq!(expected, 1024);
    let mut buf = Box::new([0u8; 1024]);
    let mut got = 0;
    loop {
        match file.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(LoadError::Open {
                    path: region.to_string(),
                    source,
                })
            }
        }
        if got == expected {
            break;
        }
    }
    if got != expected {
        return Err(LoadError::ShortRead {
            region,
            expected,
            got,
        });
    }
    Ok(buf)
}
