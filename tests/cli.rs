#![allow(non_snake_case)]

use {
	byteorder::{WriteBytesExt, LE},
	std::{
		fs,
		io::Write,
		path::Path,
		process::{Command, Output},
	},
	tempfile::tempdir,
};

/// One column ("Speed", in "km/h") and one row whose cell points at "42".
fn speedTable() -> Vec<u8> {
	let mut image = vec![0_u8; 0x138];
	(&mut image[0x11c..]).write_u16::<LE>(0x138).unwrap();
	image[0x134] = 4;
	image.write_u32::<LE>(0x09).unwrap();
	image.write_u32::<LE>(0x0a).unwrap();
	image.write_u32::<LE>(4).unwrap();
	image.write_u32::<LE>(0xDEAD_BEEF).unwrap();
	image.write_u32::<LE>(0x0b).unwrap();
	let poolOrigin = image.len();
	(&mut image[0x0c..]).write_i32::<LE>((poolOrigin - 0x10) as _).unwrap();
	for _ in 0..8 {
		image.write_u16::<LE>(2).unwrap();
	}
	for string in [&b"Speed"[..], &b"km/h"[..], &b"42"[..]] {
		image.write_u16::<LE>((string.len() + 3) as _).unwrap();
		image.write_all(string).unwrap();
		image.push(0);
	}
	image
}

fn convert(input: &Path) -> Output {
	Command::new(env!("CARGO_BIN_EXE_bintable_csv")).arg(input).output().unwrap()
}

#[test]
fn converts_a_single_column_table() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("speed.bin");
	fs::write(&input, speedTable()).unwrap();

	let output = convert(&input);
	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
	assert_eq!(fs::read_to_string(dir.path().join("speed.bin.csv")).unwrap(), "Num,1. Speed (km/h)\n1,42\n");
	assert!(String::from_utf8_lossy(&output.stdout).contains("CSV export complete: speed.bin.csv"));
}

#[test]
fn reruns_produce_identical_output() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("speed.bin");
	fs::write(&input, speedTable()).unwrap();

	assert!(convert(&input).status.success());
	let first = fs::read(dir.path().join("speed.bin.csv")).unwrap();
	assert!(convert(&input).status.success());
	assert_eq!(fs::read(dir.path().join("speed.bin.csv")).unwrap(), first);
}

#[test]
fn truncated_input_still_writes_a_csv() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("short.bin");
	fs::write(&input, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0xff, 0xff])
		.unwrap();

	let output = convert(&input);
	assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
	assert_eq!(fs::read_to_string(dir.path().join("short.bin.csv")).unwrap(), "Num\n");
}

#[test]
fn missing_input_names_the_path() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("absent.bin");

	let output = convert(&input);
	assert!(!output.status.success());
	assert!(String::from_utf8_lossy(&output.stderr).contains("absent.bin"));
	assert!(!dir.path().join("absent.bin.csv").exists());
}

#[test]
fn uncreatable_output_names_the_path() {
	let dir = tempdir().unwrap();
	let input = dir.path().join("speed.bin");
	fs::write(&input, speedTable()).unwrap();
	fs::create_dir(dir.path().join("speed.bin.csv")).unwrap();

	let output = convert(&input);
	assert!(!output.status.success());
	assert!(String::from_utf8_lossy(&output.stderr).contains("speed.bin.csv"));
	assert!(dir.path().join("speed.bin.csv").is_dir());
}

#[test]
fn wrong_argument_count_is_a_usage_error() {
	let bin = env!("CARGO_BIN_EXE_bintable_csv");
	let none = Command::new(bin).output().unwrap();
	assert!(!none.status.success());
	assert!(!none.stderr.is_empty());

	let two = Command::new(bin).args(["a.bin", "b.bin"]).output().unwrap();
	assert!(!two.status.success());
	assert!(!two.stderr.is_empty());
}
