use clap::Parser;

const ASCII_LOGO: &str = r#"
     _   _ _____ _____ ____    _____            _
    | \ | |_   _|  ___/ ___|  | ____|_  ___ __ | | ___  _ __ ___ _ __
    |  \| | | | | |_  \___ \  |  _| \ \/ / '_ \| |/ _ \| '__/ _ \ '__|
    | |\  | | | |  _|  ___) | | |___ >  <| |_) | | (_) | | |  __/ |
    |_| \_| |_| |_|   |____/  |_____/_/\_\ .__/|_|\___/|_|  \___|_|
                                         |_|
"#;

const EXAMPLES: &str = r#"
ПРИМЕРЫ ИСПОЛЬЗОВАНИЯ:

  1. СПИСОК УСТРОЙСТВ (List)
     Показать блочные устройства и разделы:
     ntfs_explorer --list

     В формате JSONL:
     ntfs_explorer -l -j

  2. ИНТЕРАКТИВНАЯ ОБОЛОЧКА (Shell)
     Открыть образ или устройство только для чтения:
     ntfs_explorer --shell /dev/sdb1

     С подробным журналом и ограничением поиска записей MFT:
     ntfs_explorer -v --scan-limit 4096 -s disk.img

     Команды оболочки: ls [path], cd <path>, pwd, cp <from> <to>, info, help, exit
"#;

#[derive(Parser, Debug)]
#[command(name = "ntfs_explorer")]
#[command(version)]
#[command(before_help = ASCII_LOGO)]
#[command(about = "Read-only NTFS volume explorer")]
#[command(after_help = EXAMPLES)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Показать блочные устройства и разделы
    #[arg(short, long, conflicts_with = "shell")]
    pub list: bool,

    /// Образ диска или устройство с NTFS
    #[arg(short, long, value_name = "IMAGE")]
    pub shell: Option<String>,

    /// Выводить ls и список устройств как JSONL
    #[arg(short, long)]
    pub json: bool,

    /// Сколько записей MFT просматривать при поиске одной записи
    #[arg(long, value_name = "N")]
    pub scan_limit: Option<u64>,

    /// Подробный журнал (debug)
    #[arg(short, long)]
    pub verbose: bool,
}
