#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

//! Decoder for an instrument's exported binary data table, and the CSV writer that goes with it.
//!
//! The container is undocumented; every offset below was found by inspecting real exports.

pub use error::{Error, Result};

pub mod error {
	use thiserror::Error;

	#[derive(Error, Debug)]
	pub enum Error {
		#[error("IO error: {0}")]
		Io(#[from] std::io::Error),

		#[error("CSV error: {0}")]
		Csv(#[from] csv::Error),
	}

	pub type Result<T> = std::result::Result<T, Error>;
}

/// Reads that give up quietly: the header fields sit at fixed offsets and a short file just yields zeros.
mod lenient {
	use {
		std::io::{self, Read, Seek, SeekFrom},
		tracing::debug,
	};

	pub(crate) trait OrZero<T> {
		fn orZero(self, what: &'static str) -> T;
	}
	impl<T: Default> OrZero<T> for io::Result<T> {
		fn orZero(self, what: &'static str) -> T {
			self.unwrap_or_else(|err| {
				debug!(what, %err, "read failed, using zero");
				T::default()
			})
		}
	}

	pub(crate) trait ReadExt: Read {
		fn readArray<const N: usize>(&mut self) -> io::Result<[u8; N]> {
			let mut array = [0_u8; N];
			self.read_exact(&mut array)?;
			Ok(array)
		}
	}
	impl<R: Read + ?Sized> ReadExt for R {}

	pub(crate) trait SeekExt: Seek {
		fn seekOrStay(&mut self, to: SeekFrom) {
			if let Err(err) = self.seek(to) {
				debug!(?to, %err, "seek failed, cursor left in place");
			}
		}

		fn streamLen(&mut self) -> io::Result<u64> {
			let position = self.stream_position()?;
			let len = self.seek(SeekFrom::End(0))?;
			if position != len {
				self.seek(SeekFrom::Start(position))?;
			}
			Ok(len)
		}
	}
	impl<S: Seek + ?Sized> SeekExt for S {}
}

pub mod pool {
	use {
		crate::lenient::SeekExt,
		byteorder::{ReadBytesExt, LE},
		std::io::{self, Read, Seek},
		tracing::debug,
	};

	/// Pool references are biased: index `0x09` names the first entry.
	pub const INDEX_BIAS: u16 = 0x09;

	/// Strings in the order they are stored, kept as raw bytes.
	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct StringPool {
		entries: Vec<Vec<u8>>,
	}

	impl StringPool {
		/// Scans `uint16`-length-prefixed entries from the cursor to EOF.
		///
		/// The length counts its own two bytes, and the last payload byte is a terminator that
		/// gets dropped. The scan ends without error at the first entry that cannot be read in full.
		pub fn scan<R: Read + Seek + ?Sized>(reader: &mut R) -> io::Result<StringPool> {
			let len = reader.streamLen()?;
			let mut entries = Vec::new();
			while reader.stream_position()? < len {
				match readEntry(reader) {
					Some(entry) => entries.push(entry),
					None => {
						debug!(position = reader.stream_position()?, len, "string pool scan stopped before EOF");
						break;
					}
				}
			}
			debug!(entries = entries.len(), "string pool scanned");

			fn readEntry<R: Read + ?Sized>(reader: &mut R) -> Option<Vec<u8>> {
				let len16 = reader.read_u16::<LE>().ok()?;
				if len16 < 3 {
					return None;
				}
				let mut payload = vec![0; usize::from(len16 - 2)];
				reader.read_exact(&mut payload).ok()?;
				payload.pop();
				Some(payload)
			}

			Ok(StringPool { entries })
		}

		/// Resolves a biased reference; anything below the bias or past the end is `None`.
		pub fn lookup(&self, index: u16) -> Option<&[u8]> {
			self.get(usize::from(index.checked_sub(INDEX_BIAS)?))
		}

		pub fn get(&self, position: usize) -> Option<&[u8]> {
			self.entries.get(position).map(Vec::as_slice)
		}

		pub fn len(&self) -> usize {
			self.entries.len()
		}

		pub fn is_empty(&self) -> bool {
			self.entries.is_empty()
		}

		pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
			self.entries.iter().map(Vec::as_slice)
		}
	}

	impl<S: Into<Vec<u8>>> FromIterator<S> for StringPool {
		fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
			StringPool { entries: iter.into_iter().map(Into::into).collect() }
		}
	}

}

pub mod table {
	use {
		crate::{
			lenient::{OrZero, ReadExt, SeekExt},
			pool::StringPool,
			Result,
		},
		byteorder::{ByteOrder, ReadBytesExt, LE},
		core::iter,
		std::io::{Read, Seek, SeekFrom},
		tracing::{debug, info, warn},
	};

	/// Header of the leading row-ordinal column.
	pub const NUM_COLUMN: &str = "Num";

	/// Pool references for one column, taken from the name pass and the unit pass over `0x138`.
	#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
	pub struct ColumnDescriptor {
		pub nameIndex: u16,
		pub unitIndex: u16,
	}

	impl ColumnDescriptor {
		/// `"<ordinal>. <name> (<unit>)"`, leaving out whatever the pool cannot resolve.
		///
		/// A resolved name with an unresolved unit keeps empty parentheses; an unresolved name
		/// with a resolved unit is just `" (<unit>)"`.
		///
		/// The empty parentheses are a deliberate break from the original exporter tool, which wrote
		/// `"<ordinal>. <name>"` with nothing appended, so such headers differ from its output by
		/// those three bytes.
		pub fn label(&self, ordinal: usize, pool: &StringPool) -> Vec<u8> {
			let mut label = Vec::new();
			let name = pool.lookup(self.nameIndex);
			if let Some(name) = name {
				label.extend_from_slice(format!("{ordinal}. ").as_bytes());
				label.extend_from_slice(name);
			}
			match (pool.lookup(self.unitIndex), name) {
				(Some(unit), _) => {
					label.extend_from_slice(b" (");
					label.extend_from_slice(unit);
					label.push(b')');
				}
				(None, Some(_)) => label.extend_from_slice(b" ()"),
				(None, None) => {}
			}
			label
		}
	}

	/// Row ordinal followed by one cell per column.
	pub type Row = Vec<Vec<u8>>;

	#[derive(Debug, Default, Clone, PartialEq, Eq)]
	pub struct OutputTable {
		pub header: Vec<Vec<u8>>,
		pub rows: Vec<Row>,
	}

	impl OutputTable {
		/// Data columns, not counting the ordinal column.
		pub fn columnCount(&self) -> usize {
			self.header.len().saturating_sub(1)
		}
	}

	/// Decodes a whole table.
	///
	/// Fixed-offset fields that cannot be read come back as zero and failed seeks leave the
	/// cursor where it was, so a truncated file produces a short or garbled table rather than an
	/// error. Errors are only returned when the source cannot report its length or position.
	pub fn decode<R: Read + Seek + ?Sized>(source: &mut R) -> Result<OutputTable> {
		let len = source.streamLen()?;

		source.seekOrStay(SeekFrom::Start(0x134));
		let columnCount = usize::from(source.read_u8().orZero("column count")) / 4;
		debug!(columnCount, len);

		source.seekOrStay(SeekFrom::Start(0x0c));
		let var32 = source.read_i32::<LE>().orZero("string pool distance");
		source.seekOrStay(SeekFrom::Current(var32.into()));
		for _ in 0..8 {
			let len16 = source.read_u16::<LE>().orZero("header entry length");
			source.seekOrStay(SeekFrom::Current(i64::from(len16) - 2));
		}
		let pool = StringPool::scan(source)?;

		let mut descriptors = vec![ColumnDescriptor::default(); columnCount];
		source.seekOrStay(SeekFrom::Start(0x138));
		for descriptor in &mut descriptors {
			descriptor.nameIndex = readRecordIndex(source, "column name record");
		}
		// units follow the names directly
		for descriptor in &mut descriptors {
			descriptor.unitIndex = readRecordIndex(source, "column unit record");
		}
		let header = iter::once(NUM_COLUMN.into())
			.chain(descriptors.iter().enumerate().map(|(i, descriptor)| descriptor.label(i + 1, &pool)))
			.collect();

		source.seekOrStay(SeekFrom::Start(0x11c));
		let len16 = source.read_u16::<LE>().orZero("data block offset");
		source.seekOrStay(SeekFrom::Start(u64::from(len16) + 8));
		let recordsCount = source.read_u32::<LE>().orZero("records count");
		source.read_u32::<LE>().orZero("records count trailer");
		let totalRows = (recordsCount as usize / 4).checked_div(columnCount).unwrap_or(0);
		debug!(recordsCount, totalRows);

		let mut rows = Vec::new();
		for rowIndex in 0..totalRows {
			if source.stream_position()? >= len {
				warn!(rowsRead = rowIndex, totalRows, "row data ends before the declared records count");
				break;
			}
			let mut row = Vec::with_capacity(columnCount + 1);
			row.push((rowIndex + 1).to_string().into_bytes());
			for _ in 0..columnCount {
				let index = readRecordIndex(source, "cell record");
				row.push(pool.lookup(index).map_or_else(|| b"0".to_vec(), <[u8]>::to_vec));
			}
			rows.push(row);
		}

		info!(columns = columnCount, rows = rows.len(), poolEntries = pool.len(), "table decoded");

		fn readRecordIndex<R: Read + ?Sized>(source: &mut R, what: &'static str) -> u16 {
			let record: [u8; 4] = source.readArray().orZero(what);
			LE::read_u16(&record[..2])
		}

		Ok(OutputTable { header, rows })
	}

}

pub mod output {
	use {
		crate::{table::OutputTable, Result},
		csv::{QuoteStyle, Terminator, WriterBuilder},
		std::{
			ffi::OsString,
			io::Write,
			path::{Path, PathBuf},
		},
	};

	/// `<input>.csv`, keeping whatever extension the input already has.
	pub fn csvPathFor(input: &Path) -> PathBuf {
		let mut path = OsString::from(input.as_os_str());
		path.push(".csv");
		path.into()
	}

	/// Writes the header row and then every data row, quoting only fields that need it.
	///
	/// Only commas, quotes, CR and LF force quoting. The original exporter tool also quoted
	/// fields starting with whitespace, so a header like `" (km/h)"` comes out unquoted here
	/// where that tool wrote it quoted.
	pub fn writeCsv<W: Write>(table: &OutputTable, destination: W) -> Result<()> {
		let mut writer = WriterBuilder::new()
			.has_headers(false)
			.flexible(true)
			.quote_style(QuoteStyle::Necessary)
			.terminator(Terminator::Any(b'\n'))
			.from_writer(destination);
		writer.write_record(&table.header)?;
		for row in &table.rows {
			writer.write_record(row)?;
		}
		writer.flush()?;
		Ok(())
	}

}
