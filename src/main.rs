use std::time::{Duration, Instant};
use std::{env, fs, process};

use log::{error, info, warn};
use minifb::{Key, KeyRepeat, Scale, Window, WindowOptions};

use chipvm::display::{HEIGHT, WIDTH};
use chipvm::sound::Sound;
use chipvm::Emulator;

/// Host keys for the hex pad 0..F: the classic 4x4 block under 1234/QWER/
/// ASDF/ZXCV.
const KEYS: [Key; 16] = [
    Key::X,    // 0
    Key::Key1, // 1
    Key::Key2, // 2
    Key::Key3, // 3
    Key::Q,    // 4
    Key::W,    // 5
    Key::E,    // 6
    Key::A,    // 7
    Key::S,    // 8
    Key::D,    // 9
    Key::Z,    // A
    Key::C,    // B
    Key::Key4, // C
    Key::R,    // D
    Key::F,    // E
    Key::V,    // F
];

const PIXEL_ON: u32 = 0x007FFF;
const PIXEL_OFF: u32 = 0x000000;

fn key_to_hex(key: Key) -> Option<u8> {
    KEYS.iter().position(|&k| k == key).map(|hex| hex as u8)
}

fn main() {
    env_logger::init();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: chipvm <rom.ch8>");
            process::exit(2);
        }
    };
    let image = match fs::read(&path) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("{path}: {err}");
            process::exit(1);
        }
    };
    let mut emu = match Emulator::new(&image, Instant::now()) {
        Ok(emu) => emu,
        Err(fault) => {
            eprintln!("{path}: {fault}");
            process::exit(1);
        }
    };
    info!("{path}: {} bytes", image.len());

    let mut window = Window::new(
        "chipvm - ESC to exit",
        WIDTH,
        HEIGHT,
        WindowOptions {
            scale: Scale::X16,
            ..WindowOptions::default()
        },
    )
    .unwrap_or_else(|err| {
        eprintln!("opening window failed: {err}");
        process::exit(1);
    });
    // ~60 fps
    window.limit_update_rate(Some(Duration::from_micros(16600)));

    let mut sound = Sound::new();
    if sound.is_none() {
        warn!("no audio output, running silent");
    }

    let mut frame = vec![0u32; WIDTH * HEIGHT];
    while window.is_open() && !window.is_key_down(Key::Escape) {
        for key in window.get_keys_pressed(KeyRepeat::No) {
            if let Some(hex) = key_to_hex(key) {
                emu.keypad.push(hex);
            }
        }
        for (hex, &key) in KEYS.iter().enumerate() {
            emu.keypad.set_held(hex as u8, window.is_key_down(key));
        }

        if let Err(fault) = emu.advance(Instant::now()) {
            error!("{path}: {fault}");
            break;
        }

        for (cell, &pixel) in frame.iter_mut().zip(emu.pixels()) {
            *cell = if pixel == 1 { PIXEL_ON } else { PIXEL_OFF };
        }
        if let Err(err) = window.update_with_buffer(&frame, WIDTH, HEIGHT) {
            error!("window update failed: {err}");
            break;
        }

        if let Some(sound) = sound.as_mut() {
            sound.set_tone(emu.tone_on());
        }
    }
}
