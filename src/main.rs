use oceanspec::{ChecksumPolicy, Error, MODELS, OceanDevice, UsbTransport,
    list_devices_with_policy};

fn print_usage() {
    println!("oceanspec - Ocean Optics USB spectrometer control tool\n");
    println!("USAGE:");
    println!("    oceanspec [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --list                      List attached spectrometers");
    println!("    --serial                    Print the serial number");
    println!("    --capabilities              List the model's capabilities\n");
    println!("    --integration-time <US>     Set integration time in microseconds");
    println!("    --trigger-mode <N>          Set the trigger mode\n");
    println!("    --spectrum                  Acquire one frame, print intensities");
    println!("    --wavelengths               Print the wavelength axis");
    println!("    --dark-pixels               Print electric dark pixel indices\n");
    println!("    --eeprom <SLOT>             Read an EEPROM slot (OOI models)\n");
    println!("    --tec-read                  Read the TEC temperature");
    println!("    --tec-set <CELSIUS>         Set the TEC setpoint");
    println!("    --tec-enable <on|off>       Enable/disable the TEC\n");
    println!("    --strobe <on|off>           Enable/disable the continuous strobe");
    println!("    --shutter <open|closed>     Open/close the shutter");
    println!("    --lamp <on|off>             Enable/disable the lamp\n");
    println!("    --strict-checksum           Fail on OBP checksum mismatch");
    println!("    --help, -h                  Show this help message\n");
    println!("EXAMPLES:");
    println!("    sudo oceanspec --list");
    println!("    sudo oceanspec --integration-time 100000 --spectrum");
    println!("    sudo oceanspec --tec-set -15 --tec-enable on");
    println!("\nSUPPORTED MODELS:");
    for model in MODELS {
        println!("    2457:{:04x}  {}", model.product_id, model.name);
    }
}

fn parse_switch(arg: &str, value: &str) -> Result<bool, Error> {
    match value.to_lowercase().as_str() {
        "on" | "open" | "true" | "1" => Ok(true),
        "off" | "closed" | "false" | "0" => Ok(false),
        _ => {
            eprintln!("Error: invalid value '{value}' for {arg} (expected on/off)");
            Err(Error::Parse(format!("invalid switch value {value:?}")))
        }
    }
}

fn checksum_policy(strict: bool) -> ChecksumPolicy {
    if strict {
        ChecksumPolicy::Strict
    } else {
        ChecksumPolicy::Warn
    }
}

fn open_first(strict: bool) -> Result<OceanDevice<UsbTransport>, Error> {
    list_devices_with_policy(checksum_policy(strict))?
        .into_iter()
        .next()
        .ok_or(Error::NoDevice)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return Ok(());
    }

    let strict = args.contains(&"--strict-checksum".to_string());

    if args.contains(&"--list".to_string()) {
        let devices = list_devices_with_policy(checksum_policy(strict))?;
        if devices.is_empty() {
            println!("No spectrometers found.");
        }
        for device in &devices {
            println!(
                "2457:{:04x}  {:<12} {}",
                device.model().product_id,
                device.model().name,
                device.serial_number()
            );
        }
        return Ok(());
    }

    let mut device = open_first(strict)?;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--strict-checksum" => {
                i += 1;
            }
            "--serial" => {
                println!("{}", device.serial_number());
                i += 1;
            }
            "--capabilities" => {
                for capability in device.capabilities() {
                    println!("{capability:?}");
                }
                i += 1;
            }
            "--spectrum" => {
                for (pixel, value) in device.get_intensities()?.iter().enumerate() {
                    println!("{pixel}\t{value}");
                }
                i += 1;
            }
            "--wavelengths" => {
                for (pixel, nm) in device.get_wavelengths()?.iter().enumerate() {
                    println!("{pixel}\t{nm}");
                }
                i += 1;
            }
            "--dark-pixels" => {
                println!("{:?}", device.get_electric_dark_pixel_indices());
                i += 1;
            }
            "--tec-read" => {
                println!("{:.1} C", device.tec_get_temperature()?);
                i += 1;
            }
            _ => {
                // Everything below takes a value.
                if i + 1 >= args.len() {
                    eprintln!("Error: {arg} requires a value");
                    return Err(Box::new(Error::Parse(format!("{arg} requires a value"))));
                }
                let value = &args[i + 1];
                match arg {
                    "--integration-time" => {
                        let micros: u32 = value.parse()?;
                        device.set_integration_time_micros(micros)?;
                        println!("Integration time set to {micros} us");
                    }
                    "--trigger-mode" => {
                        let mode: u8 = value.parse()?;
                        device.set_trigger_mode(mode)?;
                        println!("Trigger mode set to {mode}");
                    }
                    "--eeprom" => {
                        let slot: u8 = value.parse()?;
                        println!("{}", device.read_eeprom_string(slot)?);
                    }
                    "--tec-set" => {
                        let celsius: f64 = value.parse()?;
                        device.tec_set_temperature(celsius)?;
                        println!("TEC setpoint set to {celsius} C");
                    }
                    "--tec-enable" => {
                        device.tec_enable(parse_switch(arg, value)?)?;
                    }
                    "--strobe" => {
                        device.set_strobe_enable(parse_switch(arg, value)?)?;
                    }
                    "--shutter" => {
                        device.set_shutter_open(parse_switch(arg, value)?)?;
                    }
                    "--lamp" => {
                        device.set_lamp_enable(parse_switch(arg, value)?)?;
                    }
                    _ => {
                        eprintln!("Error: unknown option '{arg}'");
                        print_usage();
                        return Err(Box::new(Error::Parse(format!("unknown option {arg:?}"))));
                    }
                }
                i += 2;
            }
        }
    }

    device.close();
    Ok(())
}
