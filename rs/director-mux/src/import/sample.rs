use crate::{Error, Result};

/// One sample of a track, located by its absolute position in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
	/// Zero-based index within the track.
	pub number: u64,
	pub offset: u64,
	pub size: u32,

	/// Decode and composition time, in track ticks.
	pub dts: u64,
	pub cts: u64,
	pub duration: u32,

	pub sync: bool,
}

impl Sample {
	pub fn end(&self) -> u64 {
		self.offset.saturating_add(self.size as u64)
	}
}

/// The sample tables of a progressive (non-fragmented) track.
///
/// This is a plain copy of `stbl`, flattened into [`Sample`]s with [`SampleTable::samples`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
	/// `stts`: (sample count, delta).
	pub durations: Vec<(u32, u32)>,

	/// `ctts`: (sample count, composition offset).
	pub composition: Vec<(u32, i32)>,

	/// `stss`: one-based sync sample numbers. [`None`] means every sample is sync.
	pub sync: Option<Vec<u32>>,

	/// `stsc`: (one-based first chunk, samples per chunk).
	pub chunks: Vec<(u32, u32)>,

	/// `stsz`: the size of every sample.
	pub sizes: Vec<u32>,

	/// `stco` or `co64`: the file offset of every chunk.
	pub offsets: Vec<u64>,
}

impl SampleTable {
	pub fn len(&self) -> usize {
		self.sizes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sizes.is_empty()
	}

	/// The sum of every sample duration, in ticks.
	pub fn duration(&self) -> u64 {
		self.durations.iter().map(|&(count, delta)| count as u64 * delta as u64).sum()
	}

	pub fn samples(&self) -> Result<Vec<Sample>> {
		let count = self.sizes.len();
		let mut samples = Vec::with_capacity(count);

		let mut durations = expand(&self.durations);
		let mut composition = expand(&self.composition);
		let mut sync = self.sync.as_ref().map(|sync| sync.iter().peekable());
		let mut sizes = self.sizes.iter();
		let mut dts = 0u64;

		for (index, &chunk_offset) in self.offsets.iter().enumerate() {
			let chunk = index as u32 + 1;

			// The last run that starts at or before this chunk applies.
			let per_chunk = self
				.chunks
				.iter()
				.take_while(|&&(first, _)| first <= chunk)
				.last()
				.map(|&(_, per_chunk)| per_chunk)
				.ok_or_else(|| Error::parse("stsc does not cover chunk"))?;

			let mut offset = chunk_offset;

			for _ in 0..per_chunk {
				let Some(&size) = sizes.next() else {
					break;
				};

				let number = samples.len() as u64;
				let duration = durations.next().unwrap_or_default();
				let shift = composition.next().unwrap_or_default();

				let is_sync = match sync.as_mut() {
					None => true,
					Some(sync) => sync.next_if(|&&n| n as u64 == number + 1).is_some(),
				};

				samples.push(Sample {
					number,
					offset,
					size,
					dts,
					cts: dts.saturating_add_signed(shift as i64),
					duration,
					sync: is_sync,
				});

				offset = offset.saturating_add(size as u64);
				dts = dts.saturating_add(duration as u64);
			}
		}

		if samples.len() != count {
			return Err(Error::parse(format!(
				"chunk tables cover {} of {} samples",
				samples.len(),
				count
			)));
		}

		Ok(samples)
	}
}

fn expand<T: Copy>(runs: &[(u32, T)]) -> impl Iterator<Item = T> + '_ {
	runs.iter()
		.flat_map(|&(count, value)| std::iter::repeat_n(value, count as usize))
}

// The number of samples the chunk tables can place.
fn coverage(chunks: &[(u32, u32)], offsets: usize) -> u64 {
	let last = offsets as u64 + 1;

	chunks
		.iter()
		.enumerate()
		.map(|(index, &(first, per_chunk))| {
			let next = chunks.get(index + 1).map(|&(next, _)| next as u64).unwrap_or(last);
			next.min(last).saturating_sub(first as u64) * per_chunk as u64
		})
		.fold(0, u64::saturating_add)
}

impl TryFrom<&mp4_atom::Stbl> for SampleTable {
	type Error = Error;

	fn try_from(stbl: &mp4_atom::Stbl) -> Result<Self> {
		let durations = stbl
			.stts
			.entries
			.iter()
			.map(|entry| (entry.sample_count, entry.sample_delta))
			.collect();

		let composition = stbl
			.ctts
			.as_ref()
			.map(|ctts| {
				ctts.entries
					.iter()
					.map(|entry| (entry.sample_count, entry.sample_offset))
					.collect()
			})
			.unwrap_or_default();

		let sync = stbl.stss.as_ref().map(|stss| stss.entries.clone());

		let chunks: Vec<(u32, u32)> = stbl
			.stsc
			.entries
			.iter()
			.map(|entry| (entry.first_chunk, entry.samples_per_chunk))
			.collect();

		let offsets: Vec<u64> = match (&stbl.stco, &stbl.co64) {
			(Some(stco), _) => stco.entries.iter().map(|&offset| offset as u64).collect(),
			(None, Some(co64)) => co64.entries.clone(),
			(None, None) => Vec::new(),
		};

		let sizes = match &stbl.stsz.samples {
			mp4_atom::StszSamples::Identical { count, size } => {
				let covered = coverage(&chunks, offsets.len());
				if *count as u64 > covered {
					return Err(Error::parse(format!("stsz declares {count} samples, chunk tables cover {covered}")));
				}
				vec![*size; *count as usize]
			}
			mp4_atom::StszSamples::Different { sizes } => sizes.clone(),
		};

		Ok(Self {
			durations,
			composition,
			sync,
			chunks,
			sizes,
			offsets,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flatten() {
		let table = SampleTable {
			durations: vec![(5, 100)],
			composition: vec![(1, 0), (1, 200), (3, 0)],
			sync: Some(vec![1, 4]),
			chunks: vec![(1, 2), (3, 1)],
			sizes: vec![10, 20, 30, 40, 50],
			offsets: vec![1000, 2000, 3000, 4000],
		};

		let samples = table.samples().unwrap();
		assert_eq!(samples.len(), 5);
		assert_eq!(table.duration(), 500);

		let offsets: Vec<_> = samples.iter().map(|s| s.offset).collect();
		assert_eq!(offsets, vec![1000, 1010, 2000, 2030, 3000]);

		let sync: Vec<_> = samples.iter().map(|s| s.sync).collect();
		assert_eq!(sync, vec![true, false, false, true, false]);

		assert_eq!(samples[1].dts, 100);
		assert_eq!(samples[1].cts, 300);
		assert_eq!(samples[4].end(), 3050);
	}

	#[test]
	fn implicit_sync() {
		let table = SampleTable {
			durations: vec![(3, 1024)],
			chunks: vec![(1, 3)],
			sizes: vec![4, 4, 4],
			offsets: vec![48],
			..Default::default()
		};

		let samples = table.samples().unwrap();
		assert!(samples.iter().all(|s| s.sync));
		assert_eq!(samples[2].cts, 2048);
		assert_eq!(samples[2].offset, 56);
	}

	#[test]
	fn chunk_coverage() {
		// Chunks 1-2 hold two samples each, chunks 3-4 hold one.
		assert_eq!(coverage(&[(1, 2), (3, 1)], 4), 6);
		assert_eq!(coverage(&[(1, 2), (3, 1)], 2), 4);
		assert_eq!(coverage(&[(1, 5)], 0), 0);
		assert_eq!(coverage(&[], 10), 0);
	}

	#[test]
	fn oversized_stsz() {
		let mut stbl = mp4_atom::Stbl::default();
		stbl.stsc.entries.push(mp4_atom::StscEntry {
			first_chunk: 1,
			samples_per_chunk: 4,
			sample_description_index: 1,
		});
		stbl.stco = Some(mp4_atom::Stco { entries: vec![100, 200] });

		stbl.stsz.samples = mp4_atom::StszSamples::Identical { count: 8, size: 10 };
		let table = SampleTable::try_from(&stbl).unwrap();
		assert_eq!(table.samples().unwrap().len(), 8);

		stbl.stsz.samples = mp4_atom::StszSamples::Identical {
			count: u32::MAX,
			size: 10,
		};
		assert!(matches!(SampleTable::try_from(&stbl), Err(Error::Parse(_))));
	}

	#[test]
	fn missing_chunks() {
		let table = SampleTable {
			durations: vec![(3, 1)],
			chunks: vec![(1, 1)],
			sizes: vec![1, 1, 1],
			offsets: vec![0, 1],
			..Default::default()
		};

		assert!(matches!(table.samples(), Err(Error::Parse(_))));
	}
}
