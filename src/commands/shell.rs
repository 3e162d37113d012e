use std::io::{self, BufRead, Read, Seek, Write};

use crate::error::NtfsError;
use crate::locator::MountOptions;
use crate::models::ListEntry;
use crate::output::JsonlWriter;
use crate::session::Session;

const HELP: &str = "\
Команды:
  ls [path]        содержимое каталога
  cd <path>        сменить текущий каталог
  pwd              текущий каталог
  cp <from> <to>   скопировать файл или каталог на хост
  info             параметры тома (JSON)
  help             эта справка
  exit             выход";

pub fn run(image: &str, options: MountOptions, json: bool) -> i32 {
    println!("[*] Монтирование {}", image);
    let mut session = match Session::mount(image, options) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("[!] КРИТИЧЕСКАЯ ОШИБКА: {}", e);
            return 1;
        }
    };
    let params = session.params();
    println!(
        "[+] NTFS: кластер {} байт, запись MFT {} байт, $MFT с LCN {}",
        params.cluster_size, params.mft_record_size, params.mft_lcn
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let code = match run_loop(&mut session, stdin.lock(), stdout.lock(), json) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("[!] Ошибка ввода-вывода терминала: {}", e);
            1
        }
    };
    session.unmount();
    code
}

/// Цикл команд. Ошибки команд печатаются и не прерывают цикл;
/// завершение - по `exit` или концу ввода.
pub fn run_loop<R, I, O>(session: &mut Session<R>, mut input: I, mut out: O, json: bool) -> io::Result<()>
where
    R: Read + Seek,
    I: BufRead,
    O: Write,
{
    let mut line = String::new();
    loop {
        write!(out, "{} > ", session.pwd())?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(());
        }
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, rest)) = args.split_first() else {
            continue;
        };

        match command {
            "exit" | "quit" => return Ok(()),
            "help" => writeln!(out, "{}", HELP)?,
            "pwd" => writeln!(out, "{}", session.pwd())?,
            "info" => {
                let text = serde_json::to_string_pretty(session.params()).map_err(io::Error::from)?;
                writeln!(out, "{}", text)?;
            }
            "ls" => match session.ls(rest.first().copied()) {
                Ok(entries) => print_listing(&mut out, &entries, json)?,
                Err(e) => report(&mut out, &e)?,
            },
            "cd" => match rest.first() {
                None => writeln!(out, "cd: не указан путь")?,
                Some(path) => {
                    if let Err(e) = session.cd(path) {
                        report(&mut out, &e)?;
                    }
                }
            },
            "cp" => match rest {
                [from, to, ..] => match session.cp(from, to) {
                    Ok(copy) => {
                        let mark = if copy.is_complete() { "[+]" } else { "[!]" };
                        writeln!(out, "{} Скопировано: {}", mark, copy.copied)?;
                        if let Some(e) = &copy.first_error {
                            report(&mut out, e)?;
                        }
                    }
                    Err(e) => report(&mut out, &e)?,
                },
                _ => writeln!(out, "cp: нужно два аргумента: <from> <to>")?,
            },
            other => writeln!(out, "Неизвестная команда '{}'. Введите help", other)?,
        }
    }
}

fn print_listing<O: Write>(out: &mut O, entries: &[ListEntry], json: bool) -> io::Result<()> {
    if json {
        JsonlWriter::new(out).write_all(entries)?;
        return Ok(());
    }
    for entry in entries {
        if entry.kind.is_dir() {
            writeln!(out, "DIR:\t{}", entry.name)?;
        } else {
            writeln!(out, "FILE:\t{}\t{}", entry.name, entry.size)?;
        }
    }
    writeln!(out, "[*] Элементов: {}", entries.len())
}

fn report<O: Write>(out: &mut O, e: &NtfsError) -> io::Result<()> {
    if e.is_recoverable() {
        writeln!(out, "{}", e)
    } else {
        log::debug!("{:?}", e);
        writeln!(out, "[!] {}", e)
    }
}
