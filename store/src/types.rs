// Copyright 2020 The GrinPP Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Common storage-related types
use memmap;

use crate::core::ser::{self, FixedLength, Readable, Writeable};
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker;
use std::path::{Path, PathBuf};

/// Data file (MMR) wrapper around an append-only file.
/// All records have the same fixed size so positions map directly to byte
/// offsets.
pub struct DataFile<T> {
	file: AppendOnlyFile<T>,
}

impl<T> DataFile<T>
where
	T: FixedLength + Readable + Writeable + Debug,
{
	/// Open (or create) a file at the provided path on disk.
	pub fn open<P>(path: P) -> io::Result<DataFile<T>>
	where
		P: AsRef<Path> + Debug,
	{
		let file = AppendOnlyFile::open(path)?;
		Ok(DataFile { file })
	}

	/// Append an element to the file.
	/// Will not be written to disk until flush() is subsequently called.
	/// Alternatively discard() may be called to discard any pending changes.
	pub fn append(&mut self, data: &T) -> io::Result<u64> {
		self.file.append_elmt(data)?;
		Ok(self.size_unsync())
	}

	/// Read an element from the file by position (1-indexed).
	/// Assumes we have already "shifted" the position to account for pruned
	/// data.
	pub fn read(&self, position: u64) -> Option<T> {
		match self.file.read_as_elmt(position - 1) {
			Ok(x) => Some(x),
			Err(e) => {
				error!(
					"Corrupted storage, could not read an entry from data file: {:?}",
					e
				);
				None
			}
		}
	}

	/// Rewind the backend file to the specified position.
	pub fn rewind(&mut self, position: u64) {
		self.file.rewind(position)
	}

	/// Flush unsynced changes to the file to disk.
	pub fn flush(&mut self) -> io::Result<()> {
		self.file.flush()
	}

	/// Discard any unsynced changes to the file.
	pub fn discard(&mut self) {
		self.file.discard()
	}

	/// Size of the file in number of elements (not bytes).
	pub fn size(&self) -> u64 {
		self.file.size_in_elmts().unwrap_or(0)
	}

	/// Size of the unsync'd file, in elements (not bytes).
	pub fn size_unsync(&self) -> u64 {
		self.file.size_unsync_in_elmts().unwrap_or(0)
	}

	/// Path of the underlying file
	pub fn path(&self) -> &Path {
		self.file.path()
	}

	/// Drop underlying file handles
	pub fn release(&mut self) {
		self.file.release();
	}

	/// Write the file out to disk, pruning removed elements.
	/// The provided positions are 1-indexed.
	pub fn save_prune(&mut self, prune_pos: &[u64]) -> io::Result<()> {
		// Need to convert from 1-index to 0-index.
		let prune_idx: Vec<_> = prune_pos.iter().map(|x| x - 1).collect();
		self.file.save_prune(prune_idx.as_slice())
	}
}

/// Wrapper for a file that can be read at any position (random read) but for
/// which writes are append only. Reads are backed by a memory map (mmap(2)),
/// relying on the operating system for fast access and caching. The memory
/// map is reallocated to expand it when new writes are flushed.
///
/// Despite being append-only, the file can still be pruned and truncated. The
/// former simply happens by rewriting it, ignoring some of the data. The
/// latter by truncating the underlying file and re-creating the mmap.
pub struct AppendOnlyFile<T> {
	path: PathBuf,
	file: Option<File>,

	// Fixed size of each element in bytes.
	elmt_size: u16,

	mmap: Option<memmap::Mmap>,

	// Buffer of unsync'd bytes. These bytes will be appended to the file when
	// flushed.
	buffer: Vec<u8>,
	buffer_start_pos: u64,
	buffer_start_pos_bak: u64,
	_marker: marker::PhantomData<T>,
}

impl<T> AppendOnlyFile<T>
where
	T: FixedLength + Debug + Readable + Writeable,
{
	/// Open a file (existing or not) as append-only, backed by a mmap.
	pub fn open<P>(path: P) -> io::Result<AppendOnlyFile<T>>
	where
		P: AsRef<Path> + Debug,
	{
		let mut aof = AppendOnlyFile {
			file: None,
			path: path.as_ref().to_path_buf(),
			elmt_size: T::LEN as u16,
			mmap: None,
			buffer: vec![],
			buffer_start_pos: 0,
			buffer_start_pos_bak: 0,
			_marker: marker::PhantomData,
		};
		aof.init()?;
		Ok(aof)
	}

	/// (Re)init an underlying file and its associated memmap.
	pub fn init(&mut self) -> io::Result<()> {
		self.file = Some(
			OpenOptions::new()
				.read(true)
				.append(true)
				.create(true)
				.open(self.path.clone())?,
		);

		// If we have a non-empty file then mmap it.
		if self.size()? == 0 {
			self.buffer_start_pos = 0;
		} else {
			self.mmap = Some(unsafe { memmap::Mmap::map(&self.file.as_ref().unwrap())? });
			self.buffer_start_pos = self.size_in_elmts()?;
		}

		Ok(())
	}

	/// Size of the file in elements (not bytes).
	pub fn size_in_elmts(&self) -> io::Result<u64> {
		Ok(self.size()? / self.elmt_size as u64)
	}

	/// Size of the unsynced file in elements (not bytes).
	pub fn size_unsync_in_elmts(&self) -> io::Result<u64> {
		Ok(self.buffer_start_pos + (self.buffer.len() as u64 / self.elmt_size as u64))
	}

	/// Append element to append-only file by serializing it to bytes and
	/// appending the bytes.
	fn append_elmt(&mut self, data: &T) -> io::Result<()> {
		let mut bytes = ser::ser_vec(data).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
		self.append(&mut bytes)?;
		Ok(())
	}

	/// Append data to the file. Until the append-only file is synced, data is
	/// only written to memory.
	pub fn append(&mut self, bytes: &mut [u8]) -> io::Result<()> {
		self.buffer.extend_from_slice(bytes);
		Ok(())
	}

	/// Rewinds the data file back to a previous position.
	/// We simply "rewind" the buffer_start_pos to the specified position.
	/// Note: We do not currently support rewinding within the buffer itself.
	pub fn rewind(&mut self, pos: u64) {
		if self.buffer_start_pos_bak == 0 {
			self.buffer_start_pos_bak = self.buffer_start_pos;
		}
		self.buffer_start_pos = pos;
	}

	/// Syncs all writes (fsync), reallocating the memory map to make the newly
	/// written data accessible.
	pub fn flush(&mut self) -> io::Result<()> {
		if self.buffer_start_pos_bak > 0 {
			// Flushing a rewound state, we need to truncate via set_len()
			// before applying. Drop and recreate, or windows throws an access
			// error.
			self.mmap = None;
			self.file = None;
			{
				let file = OpenOptions::new()
					.read(true)
					.create(true)
					.write(true)
					.open(&self.path)?;

				// Set length of the file to truncate it as necessary.
				file.set_len(self.buffer_start_pos * self.elmt_size as u64)?;
			}
		}

		{
			let file = OpenOptions::new()
				.read(true)
				.create(true)
				.append(true)
				.open(&self.path)?;
			self.file = Some(file);
			self.buffer_start_pos_bak = 0;
		}

		self.file.as_mut().unwrap().write_all(&self.buffer[..])?;
		self.file.as_mut().unwrap().sync_all()?;

		self.buffer.clear();
		self.buffer_start_pos = self.size_in_elmts()?;

		// Note: file must be non-empty to memory map it
		if self.file.as_ref().unwrap().metadata()?.len() == 0 {
			self.mmap = None;
		} else {
			self.mmap = Some(unsafe { memmap::Mmap::map(&self.file.as_ref().unwrap())? });
		}

		Ok(())
	}

	/// Discard the current non-flushed data.
	pub fn discard(&mut self) {
		if self.buffer_start_pos_bak > 0 {
			// discarding a rewound state, restore the buffer start
			self.buffer_start_pos = self.buffer_start_pos_bak;
			self.buffer_start_pos_bak = 0;
		}
		self.buffer = vec![];
	}

	/// Read the bytes representing the element at the given position
	/// (0-indexed). Leverages the memory map.
	pub fn read(&self, pos: u64) -> io::Result<&[u8]> {
		if pos >= self.size_unsync_in_elmts()? {
			return Ok(<&[u8]>::default());
		}
		let offset = pos * self.elmt_size as u64;
		let length = self.elmt_size;
		let res = if pos < self.buffer_start_pos {
			self.read_from_mmap(offset, length)
		} else {
			let buffer_offset = self.buffer_start_pos * self.elmt_size as u64;
			self.read_from_buffer(offset.saturating_sub(buffer_offset), length)
		};
		Ok(res)
	}

	fn read_as_elmt(&self, pos: u64) -> io::Result<T> {
		let data = self.read(pos)?;
		ser::deserialize(&mut &data[..]).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
	}

	// Read length bytes starting at offset from the buffer.
	// Return empty slice if we do not have enough bytes in the buffer to read
	// the full length bytes.
	fn read_from_buffer(&self, offset: u64, length: u16) -> &[u8] {
		if self.buffer.len() < (offset as usize + length as usize) {
			<&[u8]>::default()
		} else {
			&self.buffer[(offset as usize)..(offset as usize + length as usize)]
		}
	}

	// Read length bytes starting at offset from the mmap.
	// Return empty slice if we do not have enough bytes in the map to read
	// the full length bytes, or if we have no mmap currently.
	fn read_from_mmap(&self, offset: u64, length: u16) -> &[u8] {
		if let Some(mmap) = &self.mmap {
			if mmap.len() < (offset as usize + length as usize) {
				<&[u8]>::default()
			} else {
				&mmap[(offset as usize)..(offset as usize + length as usize)]
			}
		} else {
			<&[u8]>::default()
		}
	}

	/// Saves a copy of the current file content, skipping data at the provided
	/// prune positions (0-indexed). prune_pos must be ordered.
	pub fn save_prune(&mut self, prune_pos: &[u64]) -> io::Result<()> {
		let tmp_path = self.path.with_extension("tmp");

		{
			let reader = File::open(&self.path)?;
			let mut buf_reader = BufReader::new(reader);

			let mut buf_writer = BufWriter::new(File::create(&tmp_path)?);

			let mut current_pos = 0;
			let mut prune_pos = prune_pos;
			let mut buf = vec![0u8; self.elmt_size as usize];
			loop {
				match buf_reader.read_exact(&mut buf) {
					Ok(_) => {}
					Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
					Err(e) => return Err(e),
				}
				if prune_pos.first() == Some(&current_pos) {
					// Pruned pos, moving on.
					prune_pos = &prune_pos[1..];
				} else {
					// Not pruned, write to file.
					buf_writer.write_all(&buf)?;
				}
				current_pos += 1;
			}
			buf_writer.flush()?;
		}

		// Replace the underlying file -
		// pmmr_data.tmp -> pmmr_data.bin
		self.replace(&tmp_path)?;

		// Now (re)init the file so everything is consistent.
		self.init()?;

		Ok(())
	}

	/// Replace the underlying file with another file, deleting the original.
	fn replace<P>(&mut self, with: P) -> io::Result<()>
	where
		P: AsRef<Path> + Debug,
	{
		self.release();
		fs::remove_file(&self.path)?;
		fs::rename(with, &self.path)?;
		Ok(())
	}

	/// Release underlying file handles
	pub fn release(&mut self) {
		self.mmap = None;
		self.file = None;
	}

	/// Current size of the file in bytes.
	pub fn size(&self) -> io::Result<u64> {
		fs::metadata(&self.path).map(|md| md.len())
	}

	/// Path of the underlying file
	pub fn path(&self) -> &Path {
		&self.path
	}
}
